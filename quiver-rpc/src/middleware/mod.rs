mod oneway;
mod recovery;
mod stream;
mod unary;

pub use oneway::{
    OnewayInboundChain,
    OnewayInboundMiddleware,
    OnewayOutboundChain,
    OnewayOutboundMiddleware,
};
pub use recovery::Recovery;
pub use stream::{
    StreamInboundChain,
    StreamInboundMiddleware,
    StreamOutboundChain,
    StreamOutboundMiddleware,
};
pub use unary::{
    UnaryInboundChain,
    UnaryInboundMiddleware,
    UnaryOutboundChain,
    UnaryOutboundMiddleware,
};
