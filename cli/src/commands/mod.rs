mod browse;
mod compare;
mod helpers;
mod sync;

pub(crate) use browse::{cmd_browse, cmd_categories, cmd_search};
pub(crate) use compare::cmd_compare;
pub(crate) use sync::{cmd_status, cmd_sync};
