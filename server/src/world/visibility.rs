use meridian_shared::NetId;

use crate::user::UserKey;

/// Decides which scene-ready users observe an object.
///
/// Consulted on every observer rebuild. The object's owner observes it
/// regardless of the answer.
pub trait VisibilityPolicy: Send {
    fn is_visible(&self, net_id: &NetId, user_key: &UserKey) -> bool;
}

/// Every scene-ready user observes every object
#[derive(Clone, Copy, Debug, Default)]
pub struct AllVisible;

impl VisibilityPolicy for AllVisible {
    fn is_visible(&self, _net_id: &NetId, _user_key: &UserKey) -> bool {
        true
    }
}

impl<F> VisibilityPolicy for F
where
    F: Fn(&NetId, &UserKey) -> bool + Send,
{
    fn is_visible(&self, net_id: &NetId, user_key: &UserKey) -> bool {
        self(net_id, user_key)
    }
}
