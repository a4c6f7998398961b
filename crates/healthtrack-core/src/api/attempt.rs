use reqwest::Method;
use serde_json::Value;

/// Attempts allowed per originating call: the original plus one retry.
const MAX_ATTEMPTS: u8 = 2;

/// One dispatch of a resource call.
///
/// Retrying produces a new value with a higher attempt number instead of
/// flagging the caller's request, so concurrent retries of identical
/// requests never share state.
#[derive(Debug, Clone)]
pub struct RequestAttempt {
    method: Method,
    path: String,
    body: Option<Value>,
    number: u8,
}

impl RequestAttempt {
    pub fn new(method: Method, path: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            method,
            path: path.into(),
            body,
            number: 1,
        }
    }

    /// The replay of this attempt, or `None` once the retry is spent.
    pub fn retry(&self) -> Option<Self> {
        if self.number >= MAX_ATTEMPTS {
            return None;
        }
        Some(Self {
            number: self.number + 1,
            ..self.clone()
        })
    }

    pub fn is_retry(&self) -> bool {
        self.number > 1
    }

    pub fn number(&self) -> u8 {
        self.number
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_retries_exactly_once() {
        let first = RequestAttempt::new(Method::GET, "api/activities/workouts/", None);
        assert!(!first.is_retry());

        let second = first.retry().unwrap();
        assert!(second.is_retry());
        assert_eq!(second.number(), 2);
        assert!(second.retry().is_none());
    }

    #[test]
    fn test_retry_replays_same_request() {
        let body = json!({"total_steps": 9000});
        let first = RequestAttempt::new(Method::PUT, "api/activities/steps/4/", Some(body.clone()));
        let second = first.retry().unwrap();

        assert_eq!(second.method(), &Method::PUT);
        assert_eq!(second.path(), "api/activities/steps/4/");
        assert_eq!(second.body(), Some(&body));
        // The original is untouched
        assert_eq!(first.number(), 1);
    }
}
