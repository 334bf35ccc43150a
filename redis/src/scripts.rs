//! Server-evaluated Lua scripts for atomic multi-key admission.
//!
//! Every check-and-increment runs end-to-end inside the coordination store's
//! single-threaded command executor; no interleaving is possible between the
//! reads and the increments. Client-side read-decide-write sequences are
//! forbidden for admission decisions.

/// KEYS=[user_key], ARGV=[item_count, max_items].
///
/// Rejects (returns 0) if the user counter would exceed the cap; otherwise
/// increments it, refreshes the 24h TTL and returns 1.
pub const USER_LIMIT_SCRIPT: &str = r"
    local user_key = KEYS[1]
    local item_count = tonumber(ARGV[1])
    local max_items = tonumber(ARGV[2])

    local current_count = tonumber(redis.call('GET', user_key) or 0)

    if current_count + item_count > max_items then
        return 0
    end

    redis.call('INCRBY', user_key, item_count)
    redis.call('EXPIRE', user_key, 86400)

    return 1
";

/// KEYS=[sale_key], ARGV=[item_count, max_items]. No TTL on the sale counter.
pub const SALE_LIMIT_SCRIPT: &str = r"
    local sale_key = KEYS[1]
    local item_count = tonumber(ARGV[1])
    local max_items = tonumber(ARGV[2])

    local current_count = tonumber(redis.call('GET', sale_key) or 0)

    if current_count + item_count > max_items then
        return 0
    end

    redis.call('INCRBY', sale_key, item_count)

    return 1
";

/// KEYS=[sale_key, user_key], ARGV=[item_count, max_sale_items, max_user_items].
///
/// Evaluates both limits; on success increments both counters. Either both
/// increment or neither.
pub const PURCHASE_SCRIPT: &str = r"
    local sale_key = KEYS[1]
    local user_key = KEYS[2]
    local item_count = tonumber(ARGV[1])
    local max_sale_items = tonumber(ARGV[2])
    local max_user_items = tonumber(ARGV[3])

    local current_sale_count = tonumber(redis.call('GET', sale_key) or 0)
    local current_user_count = tonumber(redis.call('GET', user_key) or 0)

    if current_sale_count + item_count > max_sale_items then
        return 0
    end

    if current_user_count + item_count > max_user_items then
        return 0
    end

    redis.call('INCRBY', sale_key, item_count)
    redis.call('INCRBY', user_key, item_count)

    return 1
";

/// KEYS=[sale_key, user_key], ARGV=[item_count].
///
/// Unconditional post-commit reconciliation: the durable store has already
/// decided, so both counters move together and the user counter TTL refreshes.
pub const INCREMENT_SCRIPT: &str = r"
    local sale_key = KEYS[1]
    local user_key = KEYS[2]
    local item_count = tonumber(ARGV[1])

    redis.call('INCRBY', sale_key, item_count)
    redis.call('INCRBY', user_key, item_count)
    redis.call('EXPIRE', user_key, 86400)

    return 1
";
