mod dispatcher;

pub use dispatcher::{
    Dispatcher,
    DispatcherConfig,
    MiddlewareConfig,
    Outbounds,
};
