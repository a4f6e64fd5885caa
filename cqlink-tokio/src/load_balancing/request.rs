use derive_more::Constructor;

use crate::consistency::Consistency;

/// A request executed by a `Session`.
#[derive(Constructor, Clone, Copy, Debug)]
pub struct Request<'a> {
    pub query: &'a str,
    pub consistency: Option<Consistency>,
    pub is_idempotent: bool,
}
