//! Structural validation of records and grants.
//!
//! Backends run these on every entity they accept or load, so a document or
//! event stream that violates the grant invariant is rejected as a whole.

use crate::error::ValidationError;
use crate::record::{AccessGrant, DataRecord, GrantState};

/// Validate a data record's required fields.
pub fn validate_record(record: &DataRecord) -> Result<(), ValidationError> {
    if record.content_id.is_empty() {
        return Err(ValidationError::EmptyField("content_id"));
    }
    if record.owner_id.is_empty() {
        return Err(ValidationError::EmptyField("owner_id"));
    }
    Ok(())
}

/// Validate a grant's fields and the state invariant.
///
/// `transformed_content_id` must be present and non-empty iff the state is
/// `Transformed`.
pub fn validate_grant(grant: &AccessGrant) -> Result<(), ValidationError> {
    // 1. Key fields
    if grant.content_id.is_empty() {
        return Err(ValidationError::EmptyField("content_id"));
    }
    if grant.recipient_id.is_empty() {
        return Err(ValidationError::EmptyField("recipient_id"));
    }
    if grant.owner_id.is_empty() {
        return Err(ValidationError::EmptyField("owner_id"));
    }

    // 2. Recipient key must at least be hex
    if grant.recipient_public_key.is_empty() || hex::decode(&grant.recipient_public_key).is_err() {
        return Err(ValidationError::BadRecipientKey);
    }

    // 3. Fragment reference must be a locator, never raw bytes
    if grant.fragment_reference.grant_id().is_none() {
        return Err(ValidationError::BadFragmentReference(
            grant.fragment_reference.as_str().to_string(),
        ));
    }

    // 4. State invariant
    match (&grant.state, &grant.transformed_content_id) {
        (GrantState::Transformed, None) => Err(ValidationError::TransformedWithoutId),
        (GrantState::Transformed, Some(id)) if id.is_empty() => {
            Err(ValidationError::TransformedWithoutId)
        }
        (GrantState::Issued, Some(id)) => Err(ValidationError::IssuedWithId(id.clone())),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ContentId, FragmentRef, GrantKey};

    fn grant() -> AccessGrant {
        let key = GrantKey::new("X1".into(), "R1".into());
        AccessGrant::issue(
            key.content_id.clone(),
            "owner".into(),
            key.recipient_id.clone(),
            "ab".repeat(32),
            FragmentRef::for_grant(&key.grant_id()),
        )
    }

    #[test]
    fn test_valid_grant() {
        let mut g = grant();
        assert!(validate_grant(&g).is_ok());
        g.complete("X2".into()).unwrap();
        assert!(validate_grant(&g).is_ok());
    }

    #[test]
    fn test_state_invariant_both_directions() {
        let mut g = grant();
        g.state = GrantState::Transformed;
        assert_eq!(
            validate_grant(&g),
            Err(ValidationError::TransformedWithoutId)
        );

        let mut g = grant();
        g.transformed_content_id = Some(ContentId::new("X2"));
        assert!(matches!(
            validate_grant(&g),
            Err(ValidationError::IssuedWithId(_))
        ));

        let mut g = grant();
        g.state = GrantState::Transformed;
        g.transformed_content_id = Some(ContentId::new(""));
        assert_eq!(
            validate_grant(&g),
            Err(ValidationError::TransformedWithoutId)
        );
    }

    #[test]
    fn test_bad_fragment_reference() {
        let mut g = grant();
        g.fragment_reference = FragmentRef::new("deadbeef");
        assert!(matches!(
            validate_grant(&g),
            Err(ValidationError::BadFragmentReference(_))
        ));
    }

    #[test]
    fn test_bad_recipient_key() {
        let mut g = grant();
        g.recipient_public_key = "not hex".into();
        assert_eq!(validate_grant(&g), Err(ValidationError::BadRecipientKey));
    }

    #[test]
    fn test_record_requires_owner() {
        let record = DataRecord::new("X1".into(), b"b", "".into(), "s");
        assert_eq!(
            validate_record(&record),
            Err(ValidationError::EmptyField("owner_id"))
        );
    }
}
