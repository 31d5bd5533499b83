use crate::session::IdentityState;

pub const TOOL_SET_IDENTITY: &str = "set_identity";
pub const TOOL_EXECUTE_QUERY: &str = "execute_query";

/// Which tools the model is offered for a turn, from the identity state at
/// the start of that turn. Total and deterministic; the identity tool stays
/// available after verification so the user can re-identify.
pub fn available_tools(identity: &IdentityState) -> &'static [&'static str] {
    match identity {
        IdentityState::Unverified => &[TOOL_SET_IDENTITY],
        IdentityState::Verified { .. } => &[TOOL_SET_IDENTITY, TOOL_EXECUTE_QUERY],
    }
}
