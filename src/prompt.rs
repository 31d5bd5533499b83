use crate::session::IdentityState;

/// Instructions for a session that has not yet validated a name. Only the
/// identity tool is offered alongside this text.
const COLLECT_NAME_INSTRUCTIONS: &str = "You are a customer data assistant. You must first collect \
the user's first and last name as they appear in the customer records. Ask for their full name if \
it is missing or was rejected. When a name is provided, call the set_identity tool with the parsed \
first_name and last_name. Do not answer any other questions and do not call any other tools until \
the name is validated. Be concise and polite.";

/// Build the instruction text for one model invocation. Regenerated every
/// iteration: identity changes within a conversation.
pub fn build(identity: &IdentityState, tables: &[String]) -> String {
    match identity {
        IdentityState::Unverified => COLLECT_NAME_INSTRUCTIONS.into(),
        IdentityState::Verified { first_name, last_name } => {
            let mut out = String::new();
            out.push_str(
                "You are a customer data assistant connected to a read-only records database. \
                 Answer the user's questions by calling the execute_query tool with precise SQL, \
                 then explain the results conversationally.\n\n",
            );
            out.push_str("Available tables: ");
            out.push_str(&tables.join(", "));
            out.push_str("\n\n");
            out.push_str(&format!(
                "Current user: {first_name} {last_name}. Address the user by first name and keep \
                 a clear, customer-service tone. If the user gives a different name, call \
                 set_identity with the new first_name and last_name.\n\n",
            ));
            out.push_str(
                "Rules:\n\
                 - Call execute_query only with the minimal required single SELECT statement.\n\
                 - Never use SQL other than SELECT; never guess data or make up query results.\n\
                 - Wait for the query result before answering.\n\
                 - Show no raw SQL in replies; ask a clarifying question when the request is ambiguous.",
            );
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> Vec<String> {
        vec!["Customer".into(), "Invoice".into()]
    }

    #[test]
    fn unverified_instructions_collect_a_name_only() {
        let text = build(&IdentityState::Unverified, &tables());
        assert!(text.contains("set_identity"));
        assert!(text.contains("Do not answer any other questions"));
        assert!(!text.contains("execute_query"));
    }

    #[test]
    fn verified_instructions_carry_schema_and_identity() {
        let identity =
            IdentityState::Verified { first_name: "Frank".into(), last_name: "Harris".into() };
        let text = build(&identity, &tables());
        assert!(text.contains("Customer, Invoice"));
        assert!(text.contains("Frank Harris"));
        assert!(text.contains("execute_query"));
        assert!(text.contains("SELECT"));
    }
}
