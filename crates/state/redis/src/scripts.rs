//! Lua scripts used to make multi-step Redis operations atomic.

/// `SET NX PX` with an owner token. Returns 1 on success, 0 if already held.
pub const LOCK_ACQUIRE: &str = r"
local key = KEYS[1]
local owner = ARGV[1]
local ttl_ms = ARGV[2]
if redis.call('SET', key, owner, 'NX', 'PX', ttl_ms) then
    return 1
end
return 0
";

/// Extend TTL only if still held by `owner`. Returns 1 on success, 0 otherwise.
pub const LOCK_EXTEND: &str = r"
local key = KEYS[1]
local owner = ARGV[1]
local ttl_ms = ARGV[2]
if redis.call('GET', key) == owner then
    redis.call('PEXPIRE', key, ttl_ms)
    return 1
end
return 0
";

/// Compare-and-delete: release only if still held by `owner`. Returns 1 on
/// success, 0 if the lock was already lost (e.g. to TTL expiry).
pub const LOCK_RELEASE: &str = r"
local key = KEYS[1]
local owner = ARGV[1]
if redis.call('GET', key) == owner then
    redis.call('DEL', key)
    return 1
end
return 0
";

/// `SET key value NX PX ttl` as a plain string. Returns 1 if newly set.
pub const CHECK_AND_SET: &str = r"
local key = KEYS[1]
local value = ARGV[1]
local ttl_ms = tonumber(ARGV[2])
if ttl_ms > 0 then
    if redis.call('SET', key, value, 'NX', 'PX', ttl_ms) then
        return 1
    end
else
    if redis.call('SET', key, value, 'NX') then
        return 1
    end
end
return 0
";

/// Versioned compare-and-swap against a hash with fields `v` (value) and
/// `ver` (version). Returns `{1, new_version}` on success, or
/// `{0, current_version, current_value}` on conflict.
pub const COMPARE_AND_SWAP: &str = r"
local key = KEYS[1]
local expected_version = tonumber(ARGV[1])
local new_value = ARGV[2]
local ttl_ms = tonumber(ARGV[3])

local current_version = tonumber(redis.call('HGET', key, 'ver') or '0')

if current_version == expected_version then
    local next_version = current_version + 1
    redis.call('HSET', key, 'v', new_value, 'ver', next_version)
    if ttl_ms > 0 then
        redis.call('PEXPIRE', key, ttl_ms)
    end
    return {1, next_version}
end

local current_value = redis.call('HGET', key, 'v')
return {0, current_version, current_value}
";
