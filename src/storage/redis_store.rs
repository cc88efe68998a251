//! Redis storage implementation
//!
//! Keys live under the configured prefix: `todo`, `doing` and `trash` are
//! sets, `done` is a hash of URL -> extraction result, and `settings` holds
//! the published settings record. Every transition runs as one Lua script or
//! one MULTI/EXEC pipeline, so a URL is never observed in two namespaces.

use crate::state::Namespace;
use crate::storage::traits::{Storage, StorageResult};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Script};
use std::collections::BTreeMap;

/// SPOP then SADD per key, so concurrent claimers never share a URL
const CLAIM_SCRIPT: &str = r"
    local claimed = {}
    for i = 1, tonumber(ARGV[1]) do
        local url = redis.call('SPOP', KEYS[1])
        if not url then
            break
        end
        redis.call('SADD', KEYS[2], url)
        claimed[#claimed + 1] = url
    end
    return claimed
";

/// KEYS: todo, doing, done, trash. ARGV[1]: url
const INSERT_IF_ABSENT_SCRIPT: &str = r"
    local url = ARGV[1]
    if redis.call('SISMEMBER', KEYS[1], url) == 1
        or redis.call('SISMEMBER', KEYS[2], url) == 1
        or redis.call('HEXISTS', KEYS[3], url) == 1
        or redis.call('SISMEMBER', KEYS[4], url) == 1 then
        return 0
    end
    return redis.call('SADD', KEYS[1], url)
";

const SCAN_COUNT: usize = 500;

/// Redis storage backend shared by every cooperating crawler process
pub struct RedisStorage {
    conn: MultiplexedConnection,
    keys: Keys,
    claim: Script,
    insert_if_absent: Script,
}

struct Keys {
    todo: String,
    doing: String,
    done: String,
    trash: String,
    settings: String,
}

impl Keys {
    fn new(prefix: &str) -> Self {
        Self {
            todo: format!("{}:todo", prefix),
            doing: format!("{}:doing", prefix),
            done: format!("{}:done", prefix),
            trash: format!("{}:trash", prefix),
            settings: format!("{}:settings", prefix),
        }
    }

    fn of(&self, namespace: Namespace) -> &str {
        match namespace {
            Namespace::Todo => &self.todo,
            Namespace::Doing => &self.doing,
            Namespace::Done => &self.done,
            Namespace::Trash => &self.trash,
        }
    }
}

impl RedisStorage {
    /// Connects to the Redis server at `url`
    ///
    /// # Arguments
    ///
    /// * `url` - A `redis://` or `rediss://` connection URL
    /// * `prefix` - Key prefix naming this crawl
    pub async fn connect(url: &str, prefix: &str) -> StorageResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        tracing::debug!(prefix = %prefix, "Connected to Redis");

        Ok(Self {
            conn,
            keys: Keys::new(prefix),
            claim: Script::new(CLAIM_SCRIPT),
            insert_if_absent: Script::new(INSERT_IF_ABSENT_SCRIPT),
        })
    }

    /// Atomically removes `url` from every namespace, then runs `place`
    fn move_pipeline(&self, url: &str) -> redis::Pipeline {
        let mut pipe = redis::pipe();
        pipe.atomic()
            .srem(&self.keys.todo, url)
            .ignore()
            .srem(&self.keys.doing, url)
            .ignore()
            .hdel(&self.keys.done, url)
            .ignore()
            .srem(&self.keys.trash, url)
            .ignore();
        pipe
    }

    async fn scan_set(&self, key: &str) -> StorageResult<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut members = Vec::new();
        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SSCAN")
                .arg(key)
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            members.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        // SSCAN may return an element more than once
        members.sort();
        members.dedup();
        Ok(members)
    }
}

#[async_trait]
impl Storage for RedisStorage {
    async fn ping(&self) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }

    // ===== Membership =====

    async fn exists_anywhere(&self, url: &str) -> StorageResult<bool> {
        Ok(self.namespace_of(url).await?.is_some())
    }

    async fn namespace_of(&self, url: &str) -> StorageResult<Option<Namespace>> {
        let mut conn = self.conn.clone();
        let (todo, doing, done, trash): (bool, bool, bool, bool) = redis::pipe()
            .sismember(&self.keys.todo, url)
            .sismember(&self.keys.doing, url)
            .hexists(&self.keys.done, url)
            .sismember(&self.keys.trash, url)
            .query_async(&mut conn)
            .await?;

        let found = [
            (todo, Namespace::Todo),
            (doing, Namespace::Doing),
            (done, Namespace::Done),
            (trash, Namespace::Trash),
        ]
        .into_iter()
        .find(|(present, _)| *present)
        .map(|(_, ns)| ns);
        Ok(found)
    }

    async fn insert_todo(&self, url: &str, force: bool) -> StorageResult<bool> {
        let mut conn = self.conn.clone();
        if force {
            let mut pipe = self.move_pipeline(url);
            pipe.sadd(&self.keys.todo, url).ignore();
            let _: () = pipe.query_async(&mut conn).await?;
            return Ok(true);
        }

        let added: i64 = self
            .insert_if_absent
            .key(&self.keys.todo)
            .key(&self.keys.doing)
            .key(&self.keys.done)
            .key(&self.keys.trash)
            .arg(url)
            .invoke_async(&mut conn)
            .await?;
        Ok(added > 0)
    }

    // ===== Transitions =====

    async fn claim_batch(&self, max_n: usize) -> StorageResult<Vec<String>> {
        if max_n == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let claimed: Vec<String> = self
            .claim
            .key(&self.keys.todo)
            .key(&self.keys.doing)
            .arg(max_n)
            .invoke_async(&mut conn)
            .await?;
        Ok(claimed)
    }

    async fn mark_done(&self, url: &str, result: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = self.move_pipeline(url);
        pipe.hset(&self.keys.done, url, result).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn mark_trash(&self, url: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = self.move_pipeline(url);
        pipe.sadd(&self.keys.trash, url).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    async fn requeue(&self, url: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let mut pipe = self.move_pipeline(url);
        pipe.sadd(&self.keys.todo, url).ignore();
        let _: () = pipe.query_async(&mut conn).await?;
        Ok(())
    }

    // ===== Administration =====

    async fn recover_all(&self) -> StorageResult<u64> {
        let mut conn = self.conn.clone();
        let (doing, trash): (u64, u64) = redis::pipe()
            .atomic()
            .scard(&self.keys.doing)
            .scard(&self.keys.trash)
            .sunionstore(
                &self.keys.todo,
                &[&self.keys.todo, &self.keys.doing, &self.keys.trash],
            )
            .ignore()
            .del(&[&self.keys.doing, &self.keys.trash])
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(doing + trash)
    }

    async fn flush_all(&self) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .del(&[
                &self.keys.todo,
                &self.keys.doing,
                &self.keys.done,
                &self.keys.trash,
            ])
            .await?;
        Ok(())
    }

    // ===== Enumeration =====

    async fn size(&self, namespace: Namespace) -> StorageResult<u64> {
        let mut conn = self.conn.clone();
        let key = self.keys.of(namespace);
        let count: u64 = match namespace {
            Namespace::Done => conn.hlen(key).await?,
            _ => conn.scard(key).await?,
        };
        Ok(count)
    }

    async fn enumerate(&self, namespace: Namespace) -> StorageResult<Vec<String>> {
        match namespace {
            Namespace::Done => Ok(self.enumerate_done_as_map().await?.into_keys().collect()),
            _ => self.scan_set(self.keys.of(namespace)).await,
        }
    }

    async fn enumerate_done_as_map(&self) -> StorageResult<BTreeMap<String, String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut done = BTreeMap::new();
        loop {
            let (next, flat): (u64, Vec<String>) = redis::cmd("HSCAN")
                .arg(&self.keys.done)
                .arg(cursor)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await?;
            for pair in flat.chunks_exact(2) {
                done.insert(pair[0].clone(), pair[1].clone());
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(done)
    }

    // ===== Shared settings =====

    async fn put_settings(&self, record: &str) -> StorageResult<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.set(&self.keys.settings, record).await?;
        Ok(())
    }

    async fn get_settings(&self) -> StorageResult<Option<String>> {
        let mut conn = self.conn.clone();
        let record: Option<String> = conn.get(&self.keys.settings).await?;
        Ok(record)
    }
}
