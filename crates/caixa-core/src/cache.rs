use std::sync::Arc;

/// Cache key for one account's transaction listing.
pub fn listing_cache_key(user_id: i64, account_id: i64) -> String {
    format!("user_{user_id}_account_{account_id}_transactions")
}

pub type SharedCache = Arc<dyn ListingCache>;

/// Read-through / write-invalidate cache in front of the listing query.
///
/// Values are opaque serialized listings; entries carry no expiry and are
/// removed only by `invalidate`. Invalidating an absent key is a no-op, and
/// no method may fail: a cache problem must never mask the result of the
/// operation that touched it.
pub trait ListingCache: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn invalidate(&self, key: &str);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_is_derived_from_user_and_account() {
        assert_eq!(listing_cache_key(3, 9), "user_3_account_9_transactions");
    }
}
