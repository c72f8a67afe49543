use std::sync::{Mutex, MutexGuard, PoisonError};

pub(crate) fn is_default<D: Default + PartialEq>(value: &D) -> bool {
    value == &D::default()
}

/// Lock a mutex, ignoring poisoning.
///
/// All state guarded this way is left consistent between statements, so a panicking holder
/// doesn't invalidate it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Check if an MQTT topic matches a subscription filter, supporting `+` and `#` wildcards.
pub(crate) fn topic_matches(filter: &str, topic: &str) -> bool {
    let mut filter = filter.split('/');
    let mut topic = topic.split('/');

    loop {
        match (filter.next(), topic.next()) {
            (Some("#"), _) => return true,
            (Some("+"), Some(_)) => {}
            (Some(f), Some(t)) if f == t => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_topic_matches() {
        assert!(topic_matches("a/b/c", "a/b/c"));
        assert!(!topic_matches("a/b/c", "a/b"));
        assert!(!topic_matches("a/b", "a/b/c"));

        assert!(topic_matches("homeassistant/+/d1/+/config", "homeassistant/sensor/d1/x/config"));
        assert!(!topic_matches("homeassistant/+/d1/+/config", "homeassistant/device/d1/config"));
        assert!(!topic_matches("homeassistant/+/d1/+/config", "homeassistant/sensor/d2/x/config"));

        assert!(topic_matches("homeassistant/#", "homeassistant/device/d1/config"));
        assert!(topic_matches("#", "anything/at/all"));
    }

    #[test]
    fn test_is_default() {
        assert!(is_default(&0u16));
        assert!(is_default(&String::new()));
        assert!(!is_default(&Some(1)));
    }
}
