//! Redis-backed queue store.
//!
//! Key layout for a queue named `q`:
//! - `q:id`         INCR counter for job ids
//! - `q:job:{id}`   job record (JSON)
//! - `q:waiting`    ZSET of ids scored by ready time (ms); ids are zero-padded so
//!                  equal scores sort in enqueue order
//! - `q:active`     ZSET of claimed ids scored by lease deadline (ms)
//! - `q:completed`  LIST of ids, newest first, trimmed to the retention cap
//! - `q:failed`     LIST of ids, newest first, trimmed to the retention cap
//! - `q:paused`     present while the queue is paused

use crate::error::{QueueError, QueueResult};
use crate::job::{JobId, JobStatus, NewJob, QueueCounts, StoredJob};
use crate::store::{QueueStore, Retention};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use redis::aio::ConnectionManager;
use tracing::{debug, warn};

/// Move one ready id to the active set and swap in its active record, but only
/// if the record is still the one the caller read.
///
/// Returns 1 on success, 0 when another claimer got there first, -1 when paused.
static CLAIM_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        if redis.call('EXISTS', KEYS[3]) == 1 then
            return -1
        end
        local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
        if not score or tonumber(score) > tonumber(ARGV[2]) then
            return 0
        end
        if redis.call('GET', KEYS[4]) ~= ARGV[4] then
            return 0
        end
        redis.call('ZREM', KEYS[1], ARGV[1])
        redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
        redis.call('SET', KEYS[4], ARGV[5])
        return 1
        ",
    )
});

/// Re-lease up to `limit` active ids whose lease expired and return their records.
static RECLAIM_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        local ids = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, tonumber(ARGV[3]))
        local records = {}
        for _, id in ipairs(ids) do
            local raw = redis.call('GET', ARGV[4] .. id)
            if raw then
                redis.call('ZADD', KEYS[1], 'XX', ARGV[2], id)
                table.insert(records, raw)
            else
                redis.call('ZREM', KEYS[1], id)
            end
        end
        return records
        ",
    )
});

/// Claim attempts lost to concurrent claimers before giving up for this poll.
const MAX_CLAIM_RACES: usize = 8;

/// Move an active id onto a finished list and trim that list, deleting pruned records.
static FINISH_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
            return -1
        end
        redis.call('SET', ARGV[4] .. ARGV[1], ARGV[2])
        redis.call('LPUSH', KEYS[2], ARGV[1])
        local keep = tonumber(ARGV[3])
        local pruned = redis.call('LRANGE', KEYS[2], keep, -1)
        for _, id in ipairs(pruned) do
            redis.call('DEL', ARGV[4] .. id)
        end
        if keep == 0 then
            redis.call('DEL', KEYS[2])
        else
            redis.call('LTRIM', KEYS[2], 0, keep - 1)
        end
        return #pruned
        ",
    )
});

/// Move an active id back to the waiting set.
static RESCHEDULE_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        if redis.call('ZREM', KEYS[1], ARGV[1]) == 0 then
            return 0
        end
        redis.call('SET', ARGV[4] .. ARGV[1], ARGV[2])
        redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
        return 1
        ",
    )
});

/// Move one failed id back to the waiting set; no-op if someone else already did.
static REVIVE_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        if redis.call('LREM', KEYS[1], 1, ARGV[1]) == 0 then
            return 0
        end
        redis.call('SET', ARGV[4] .. ARGV[1], ARGV[2])
        redis.call('ZADD', KEYS[2], ARGV[3], ARGV[1])
        return 1
        ",
    )
});

/// Delete every waiting id and its record.
static DRAIN_SCRIPT: Lazy<redis::Script> = Lazy::new(|| {
    redis::Script::new(
        r"
        local ids = redis.call('ZRANGE', KEYS[1], 0, -1)
        for _, id in ipairs(ids) do
            redis.call('DEL', ARGV[1] .. id)
        end
        redis.call('DEL', KEYS[1])
        return #ids
        ",
    )
});

fn member(id: JobId) -> String {
    format!("{id:020}")
}

pub struct RedisQueueStore {
    redis: ConnectionManager,
    name: String,
    retention: Retention,
}

impl RedisQueueStore {
    pub fn new(redis: ConnectionManager, name: impl Into<String>) -> Self {
        Self::with_retention(redis, name, Retention::default())
    }

    pub fn with_retention(
        redis: ConnectionManager,
        name: impl Into<String>,
        retention: Retention,
    ) -> Self {
        Self {
            redis,
            name: name.into(),
            retention,
        }
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}:{}", self.name, suffix)
    }

    fn job_prefix(&self) -> String {
        format!("{}:job:", self.name)
    }

    fn job_key(&self, id: JobId) -> String {
        format!("{}{}", self.job_prefix(), member(id))
    }

    async fn load(&self, id: JobId) -> QueueResult<StoredJob> {
        self.get(id).await?.ok_or(QueueError::NotFound(id))
    }

    async fn finish(&self, job: &StoredJob, list: &str, keep: usize) -> QueueResult<()> {
        let mut conn = self.redis.clone();
        let data = serde_json::to_string(job)?;

        let pruned: i64 = FINISH_SCRIPT
            .key(self.key("active"))
            .key(self.key(list))
            .arg(member(job.id))
            .arg(data)
            .arg(keep)
            .arg(self.job_prefix())
            .invoke_async(&mut conn)
            .await?;

        if pruned < 0 {
            return Err(QueueError::NotFound(job.id));
        }
        if pruned > 0 {
            debug!(queue = %self.name, list, pruned, "Pruned finished jobs past retention");
        }
        Ok(())
    }
}

#[async_trait]
impl QueueStore for RedisQueueStore {
    fn queue_name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, job: NewJob) -> QueueResult<JobId> {
        let mut conn = self.redis.clone();
        let id: JobId = redis::cmd("INCR")
            .arg(self.key("id"))
            .query_async(&mut conn)
            .await?;

        let stored = job.into_stored(id);
        let data = serde_json::to_string(&stored)?;

        let _: () = redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.job_key(id))
            .arg(data)
            .ignore()
            .cmd("ZADD")
            .arg(self.key("waiting"))
            .arg(stored.ready_at_ms)
            .arg(member(id))
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(id)
    }

    async fn claim(&self, now_ms: i64, lease_until_ms: i64) -> QueueResult<Option<StoredJob>> {
        let mut conn = self.redis.clone();

        for _ in 0..MAX_CLAIM_RACES {
            let next: Vec<String> = redis::cmd("ZRANGEBYSCORE")
                .arg(self.key("waiting"))
                .arg("-inf")
                .arg(now_ms)
                .arg("LIMIT")
                .arg(0)
                .arg(1)
                .query_async(&mut conn)
                .await?;
            let Some(member_id) = next.into_iter().next() else {
                return Ok(None);
            };

            let job_key = format!("{}{}", self.job_prefix(), member_id);
            let raw: Option<String> = redis::cmd("GET")
                .arg(&job_key)
                .query_async(&mut conn)
                .await?;
            let Some(raw) = raw else {
                // Claimed, finished and pruned between the two reads
                continue;
            };

            let mut job: StoredJob = serde_json::from_str(&raw)?;
            job.status = JobStatus::Active;

            let claimed: i64 = CLAIM_SCRIPT
                .key(self.key("waiting"))
                .key(self.key("active"))
                .key(self.key("paused"))
                .key(&job_key)
                .arg(&member_id)
                .arg(now_ms)
                .arg(lease_until_ms)
                .arg(&raw)
                .arg(serde_json::to_string(&job)?)
                .invoke_async(&mut conn)
                .await?;

            match claimed {
                1 => return Ok(Some(job)),
                -1 => return Ok(None),
                _ => debug!(queue = %self.name, member = %member_id, "Lost claim race, retrying"),
            }
        }

        Ok(None)
    }

    async fn reclaim_stalled(
        &self,
        now_ms: i64,
        lease_until_ms: i64,
        limit: usize,
    ) -> QueueResult<Vec<StoredJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();
        let raws: Vec<String> = RECLAIM_SCRIPT
            .key(self.key("active"))
            .arg(now_ms)
            .arg(lease_until_ms)
            .arg(limit)
            .arg(self.job_prefix())
            .invoke_async(&mut conn)
            .await?;

        raws.iter()
            .map(|raw| serde_json::from_str(raw).map_err(QueueError::from))
            .collect()
    }

    async fn complete(&self, id: JobId, finished_at_ms: i64) -> QueueResult<()> {
        let mut job = self.load(id).await?;
        job.status = JobStatus::Completed;
        job.finished_at_ms = Some(finished_at_ms);
        self.finish(&job, "completed", self.retention.keep_completed)
            .await
    }

    async fn retry_later(
        &self,
        id: JobId,
        attempts_made: u32,
        error: &str,
        ready_at_ms: i64,
    ) -> QueueResult<()> {
        let mut job = self.load(id).await?;
        job.status = JobStatus::Waiting;
        job.attempts_made = attempts_made;
        job.last_error = Some(error.to_string());
        job.ready_at_ms = ready_at_ms;

        let mut conn = self.redis.clone();
        let moved: i64 = RESCHEDULE_SCRIPT
            .key(self.key("active"))
            .key(self.key("waiting"))
            .arg(member(id))
            .arg(serde_json::to_string(&job)?)
            .arg(ready_at_ms)
            .arg(self.job_prefix())
            .invoke_async(&mut conn)
            .await?;

        if moved == 0 {
            return Err(QueueError::NotFound(id));
        }
        Ok(())
    }

    async fn fail(
        &self,
        id: JobId,
        attempts_made: u32,
        error: &str,
        finished_at_ms: i64,
    ) -> QueueResult<()> {
        let mut job = self.load(id).await?;
        job.status = JobStatus::Failed;
        job.attempts_made = attempts_made;
        job.last_error = Some(error.to_string());
        job.finished_at_ms = Some(finished_at_ms);
        self.finish(&job, "failed", self.retention.keep_failed).await
    }

    async fn counts(&self, now_ms: i64) -> QueueResult<QueueCounts> {
        let mut conn = self.redis.clone();
        let waiting_key = self.key("waiting");

        let (waiting, delayed, active, completed, failed): (u64, u64, u64, u64, u64) =
            redis::pipe()
                .cmd("ZCOUNT")
                .arg(&waiting_key)
                .arg("-inf")
                .arg(now_ms)
                .cmd("ZCOUNT")
                .arg(&waiting_key)
                .arg(format!("({now_ms}"))
                .arg("+inf")
                .cmd("ZCARD")
                .arg(self.key("active"))
                .cmd("LLEN")
                .arg(self.key("completed"))
                .cmd("LLEN")
                .arg(self.key("failed"))
                .query_async(&mut conn)
                .await?;

        Ok(QueueCounts {
            waiting,
            active,
            completed,
            failed,
            delayed,
        })
    }

    async fn set_paused(&self, paused: bool) -> QueueResult<()> {
        let mut conn = self.redis.clone();
        let cmd = if paused {
            let mut cmd = redis::cmd("SET");
            cmd.arg(self.key("paused")).arg(1);
            cmd
        } else {
            let mut cmd = redis::cmd("DEL");
            cmd.arg(self.key("paused"));
            cmd
        };
        let _: () = cmd.query_async(&mut conn).await?;
        Ok(())
    }

    async fn is_paused(&self) -> QueueResult<bool> {
        let mut conn = self.redis.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.key("paused"))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn drain(&self) -> QueueResult<u64> {
        let mut conn = self.redis.clone();
        let drained: u64 = DRAIN_SCRIPT
            .key(self.key("waiting"))
            .arg(self.job_prefix())
            .invoke_async(&mut conn)
            .await?;
        Ok(drained)
    }

    async fn retry_failed(&self, now_ms: i64) -> QueueResult<u64> {
        let mut conn = self.redis.clone();
        let members: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key("failed"))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await?;

        let mut retried = 0;
        // Oldest failure first so revived jobs keep their relative order
        for member_id in members.iter().rev() {
            let raw: Option<String> = redis::cmd("GET")
                .arg(format!("{}{}", self.job_prefix(), member_id))
                .query_async(&mut conn)
                .await?;
            let Some(raw) = raw else {
                warn!(queue = %self.name, member = %member_id, "Failed job record missing");
                continue;
            };

            let mut job: StoredJob = serde_json::from_str(&raw)?;
            job.status = JobStatus::Waiting;
            job.attempts_made = 0;
            job.last_error = None;
            job.finished_at_ms = None;
            job.ready_at_ms = now_ms;

            let moved: i64 = REVIVE_SCRIPT
                .key(self.key("failed"))
                .key(self.key("waiting"))
                .arg(member_id)
                .arg(serde_json::to_string(&job)?)
                .arg(now_ms)
                .arg(self.job_prefix())
                .invoke_async(&mut conn)
                .await?;
            retried += moved as u64;
        }

        Ok(retried)
    }

    async fn failed(&self, limit: usize) -> QueueResult<Vec<StoredJob>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut conn = self.redis.clone();
        let members: Vec<String> = redis::cmd("LRANGE")
            .arg(self.key("failed"))
            .arg(0)
            .arg(limit as i64 - 1)
            .query_async(&mut conn)
            .await?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = members
            .iter()
            .map(|m| format!("{}{}", self.job_prefix(), m))
            .collect();
        let raws: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;

        raws.into_iter()
            .flatten()
            .map(|raw| serde_json::from_str(&raw).map_err(QueueError::from))
            .collect()
    }

    async fn get(&self, id: JobId) -> QueueResult<Option<StoredJob>> {
        let mut conn = self.redis.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.job_key(id))
            .query_async(&mut conn)
            .await?;
        raw.map(|raw| serde_json::from_str(&raw).map_err(QueueError::from))
            .transpose()
    }

    async fn ping(&self) -> QueueResult<()> {
        let mut conn = self.redis.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_members_sort_in_id_order() {
        assert_eq!(member(42), "00000000000000000042");
        assert!(member(9) < member(10));
        assert!(member(99) < member(100));
    }
}
