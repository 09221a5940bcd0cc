mod chooser;
mod facade;
mod list;
mod pending_heap;
mod round_robin;
mod single;

pub use chooser::Chooser;
pub use facade::PeerFacade;
pub use list::{
    List,
    ListConfig,
    ListUpdateError,
    ListUpdates,
    OnFinish,
};
pub use pending_heap::PendingHeap;
pub use round_robin::RoundRobin;
pub use single::Single;
