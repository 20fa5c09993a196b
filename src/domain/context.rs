//! Operation Context
//!
//! Who is asking and under which correlation id. Built once per request by the
//! API layer and passed to handlers explicitly.

use uuid::Uuid;

/// Caller identity and tracing ids for one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationContext {
    /// Caller as asserted by the authenticating gateway (`X-Request-User-Id`)
    pub request_user_id: Option<Uuid>,

    /// Ties together the logs of one request across services
    pub correlation_id: Option<Uuid>,
}

impl OperationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_request_user(mut self, user_id: Uuid) -> Self {
        self.request_user_id = Some(user_id);
        self
    }

    pub fn with_correlation_id(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }

    /// Generate a correlation id unless the caller supplied one
    pub fn ensure_correlation_id(&mut self) -> Uuid {
        *self.correlation_id.get_or_insert_with(Uuid::new_v4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_context() {
        let context = OperationContext::new();
        assert!(context.request_user_id.is_none());
        assert!(context.correlation_id.is_none());
    }

    #[test]
    fn test_supplied_correlation_id_is_kept() {
        let supplied = Uuid::new_v4();
        let mut context = OperationContext::new()
            .with_request_user(Uuid::new_v4())
            .with_correlation_id(supplied);

        assert_eq!(context.ensure_correlation_id(), supplied);
    }

    #[test]
    fn test_generated_correlation_id_is_stable() {
        let mut context = OperationContext::new();

        let id = context.ensure_correlation_id();
        assert_eq!(context.correlation_id, Some(id));
        assert_eq!(context.ensure_correlation_id(), id);
    }
}
