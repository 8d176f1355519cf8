//! Lua scripts run atomically on the Redis server.

use redis::Script;
use std::sync::OnceLock;

/// KEYS[1] counter key. ARGV: cost, window seconds. Returns the new count.
///
/// The expiry is only set when the key has none, so a window's TTL is
/// anchored to its first request.
const FIXED_WINDOW: &str = r"
local count = redis.call('INCRBY', KEYS[1], ARGV[1])
if redis.call('TTL', KEYS[1]) == -1 then
  redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return count
";

/// KEYS[1] bucket hash. ARGV: capacity, refill per second, cost, idle TTL.
/// Returns `{allowed, tokens}` with tokens as a string to keep the fraction.
///
/// Refill runs against the server clock so workers with skewed clocks agree.
/// A cost of zero refills and persists without consuming.
const TOKEN_BUCKET: &str = r"
local clock = redis.call('TIME')
local now = tonumber(clock[1]) + tonumber(clock[2]) / 1000000
local capacity = tonumber(ARGV[1])
local refill = tonumber(ARGV[2])
local cost = tonumber(ARGV[3])
local ttl = tonumber(ARGV[4])

local state = redis.call('HMGET', KEYS[1], 'tokens', 'ts')
local tokens = tonumber(state[1])
local ts = tonumber(state[2])
if tokens == nil or ts == nil then
  tokens = capacity
  ts = now
end

if now > ts then
  tokens = math.min(capacity, tokens + (now - ts) * refill)
  ts = now
end
if tokens < 0 then
  tokens = 0
end

local allowed = 0
if tokens + 0.000001 >= cost then
  tokens = math.max(0, tokens - cost)
  allowed = 1
end

redis.call('HSET', KEYS[1], 'tokens', tostring(tokens), 'ts', tostring(ts))
redis.call('EXPIRE', KEYS[1], ttl)
return { allowed, tostring(tokens) }
";

pub(crate) fn fixed_window() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(FIXED_WINDOW))
}

pub(crate) fn token_bucket() -> &'static Script {
    static SCRIPT: OnceLock<Script> = OnceLock::new();
    SCRIPT.get_or_init(|| Script::new(TOKEN_BUCKET))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_have_distinct_hashes() {
        assert_ne!(fixed_window().get_hash(), token_bucket().get_hash());
    }

    #[test]
    fn test_fixed_window_only_sets_missing_ttl() {
        assert!(FIXED_WINDOW.contains("== -1"));
    }

    #[test]
    fn test_token_bucket_reads_server_clock() {
        assert!(TOKEN_BUCKET.contains("redis.call('TIME')"));
        assert!(!TOKEN_BUCKET.contains("ARGV[5]"));
    }
}
