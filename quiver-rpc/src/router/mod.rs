mod router;

pub use router::{
    HandlerSpec,
    MapRouter,
    Procedure,
    Router,
};
