//! Identifier conventions shared across the workspace.

const COLLECTION_SEPARATOR: &str = "___";

/// Build the collection id used as granule parent and in every record:
/// `name___version`.
pub fn collection_id(name: &str, version: &str) -> String {
    format!("{name}{COLLECTION_SEPARATOR}{version}")
}

/// Split a collection id back into `(name, version)`.
pub fn split_collection_id(collection_id: &str) -> Option<(&str, &str)> {
    collection_id.split_once(COLLECTION_SEPARATOR)
}

/// Derive an execution ARN from its state machine ARN and execution name.
///
/// `arn:aws:states:us-east-1:123:stateMachine:Ingest` + `abc` becomes
/// `arn:aws:states:us-east-1:123:execution:Ingest:abc`.
pub fn execution_arn(state_machine_arn: &str, execution_name: &str) -> Option<String> {
    if state_machine_arn.is_empty() || execution_name.is_empty() {
        return None;
    }
    let base = state_machine_arn.replacen(":stateMachine:", ":execution:", 1);
    Some(format!("{base}:{execution_name}"))
}

/// Invert [`execution_arn`]: recover the state machine ARN.
pub fn state_machine_arn(execution_arn: &str) -> Option<String> {
    let (prefix, _name) = execution_arn.rsplit_once(':')?;
    if !prefix.contains(":execution:") {
        return None;
    }
    Some(prefix.replacen(":execution:", ":stateMachine:", 1))
}

/// The trailing segment of an execution ARN.
pub fn execution_name_from_arn(execution_arn: &str) -> Option<&str> {
    execution_arn
        .rsplit_once(':')
        .map(|(_, name)| name)
        .filter(|name| !name.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SM: &str = "arn:aws:states:us-east-1:123456789012:stateMachine:IngestGranule";

    #[test]
    fn execution_arn_round_trips_to_state_machine() {
        let arn = execution_arn(SM, "run-1").unwrap();
        assert_eq!(
            arn,
            "arn:aws:states:us-east-1:123456789012:execution:IngestGranule:run-1"
        );
        assert_eq!(state_machine_arn(&arn).as_deref(), Some(SM));
        assert_eq!(execution_name_from_arn(&arn), Some("run-1"));
    }

    #[test]
    fn execution_arn_requires_both_parts() {
        assert_eq!(execution_arn("", "x"), None);
        assert_eq!(execution_arn(SM, ""), None);
    }

    #[test]
    fn collection_id_splits_on_triple_underscore() {
        let id = collection_id("MOD09GQ", "006");
        assert_eq!(id, "MOD09GQ___006");
        assert_eq!(split_collection_id(&id), Some(("MOD09GQ", "006")));
        assert_eq!(split_collection_id("no-separator"), None);
    }
}
