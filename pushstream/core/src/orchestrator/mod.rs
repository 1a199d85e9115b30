//! Job Orchestrators
//!
//! Both orchestrators drive a [`StreamManager`](crate::streaming::StreamManager)
//! through the same lifecycle: open, run work inside a progress scope, push
//! the terminal marker, clean up.
//!
//! - [`MultiItemOrchestrator`]: many independent items, one outcome each
//! - [`SingleUnitOrchestrator`]: one post-processing unit, one outcome

use std::any::Any;

mod multi_item;
mod single_unit;

pub use multi_item::MultiItemOrchestrator;
pub use single_unit::{PostProcessError, SingleUnitOrchestrator};

/// Best-effort text of a caught panic payload
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "handler panicked".to_string()
    }
}
