// Query Builder
//
// Emits the storage statements. The per-queue table name is interpolated
// from the queue identifier, which is validated long before it reaches this
// module; everything else is a bound parameter.

use plainq_core::domain::QueueId;
use plainq_core::port::queue_storage::{OrderBy, SortBy};

pub(crate) const PROPS_COLUMNS: &str = "queue_id, queue_name, created_at, last_swept_at, \
     retention_period_seconds, visibility_timeout_seconds, max_receive_attempts, \
     eviction_policy, dead_letter_queue_id";

pub(crate) const INSERT_QUEUE_PROPS: &str = "insert into queue_properties \
     (queue_id, queue_name, created_at, last_swept_at, retention_period_seconds, \
     visibility_timeout_seconds, max_receive_attempts, eviction_policy, dead_letter_queue_id) \
     values (?, ?, ?, ?, ?, ?, ?, ?, ?)";

pub(crate) const DELETE_QUEUE_PROPS: &str = "delete from queue_properties where queue_id = ?";

pub(crate) const COUNT_QUEUES: &str = "select count(*) from queue_properties";

/// Advances the sweep cursor after a successful GC pass.
pub(crate) const UPDATE_LAST_SWEPT: &str =
    "update queue_properties set last_swept_at = ? where queue_id = ?";

/// Pages through queues whose last sweep is older than the cutoff.
pub(crate) const SELECT_QUEUES_FOR_GC: &str = "select queue_id from queue_properties \
     where last_swept_at < ? order by last_swept_at asc limit ? offset ?";

pub(crate) fn select_props_by_id() -> String {
    format!("select {PROPS_COLUMNS} from queue_properties where queue_id = ?")
}

pub(crate) fn select_props_by_name() -> String {
    format!("select {PROPS_COLUMNS} from queue_properties where queue_name = ?")
}

/// Name of the backing message table for a queue. This is the only place the
/// table name is composed; the prefix keeps it a valid unquoted identifier
/// for any id alphabet.
pub(crate) fn queue_table(queue_id: &QueueId) -> String {
    format!("q_{queue_id}")
}

/// Statements creating the per-queue table and its supporting indices.
pub(crate) fn create_queue_table(queue_id: &QueueId) -> [String; 3] {
    let table = queue_table(queue_id);

    [
        format!(
            "create table {table} (\
             msg_id text not null, \
             msg_body blob not null, \
             created_at integer not null, \
             visible_at integer not null, \
             retries integer not null default 0, \
             constraint {table}_pk primary key (msg_id))"
        ),
        format!("create index if not exists {table}_created_at_idx on {table} (created_at)"),
        format!("create index if not exists {table}_visible_at_idx on {table} (visible_at)"),
    ]
}

pub(crate) fn drop_queue_table(queue_id: &QueueId) -> String {
    format!("drop table {}", queue_table(queue_id))
}

/// Binds: msg_id, msg_body, created_at, visible_at. Retries start at zero.
pub(crate) fn insert_message(queue_id: &QueueId) -> String {
    format!(
        "insert into {} (msg_id, msg_body, created_at, visible_at) values (?, ?, ?, ?)",
        queue_table(queue_id)
    )
}

/// Claims up to `limit` receivable messages in one statement: selects them in
/// creation order (ties break by the time-ordered message id), pushes their
/// visibility out, increments retries, and returns the claimed rows.
/// Binds: visible_at, now, max_attempts, limit.
pub(crate) fn receive_messages(queue_id: &QueueId) -> String {
    let table = queue_table(queue_id);

    format!(
        "update {table} set visible_at = ?, retries = retries + 1 \
         where msg_id in (select msg_id from {table} \
         where visible_at <= ? and retries <= ? order by created_at asc, msg_id asc limit ?) \
         returning msg_id, msg_body"
    )
}

pub(crate) fn delete_message(queue_id: &QueueId) -> String {
    format!("delete from {} where msg_id = ?", queue_table(queue_id))
}

pub(crate) fn purge_queue(queue_id: &QueueId) -> String {
    format!("delete from {}", queue_table(queue_id))
}

pub(crate) fn count_messages(queue_id: &QueueId) -> String {
    format!("select count(*) from {}", queue_table(queue_id))
}

/// Binds: max_attempts, retention cutoff (unix milliseconds).
pub(crate) fn drop_expired_messages(queue_id: &QueueId) -> String {
    format!(
        "delete from {} where retries >= ? or created_at <= ?",
        queue_table(queue_id)
    )
}

/// Binds: max_attempts, retention cutoff (unix milliseconds).
pub(crate) fn select_expired_messages(queue_id: &QueueId) -> String {
    format!(
        "select msg_id, msg_body from {} where retries >= ? or created_at <= ?",
        queue_table(queue_id)
    )
}

/// Properties-list statement with the pagination cursor and sort key plumbed
/// in. Binds, in order: the prefix pattern (when `with_prefix`), the cursor
/// value (when `with_cursor`), and the limit.
pub(crate) fn list_queues(
    order_by: OrderBy,
    sort_by: SortBy,
    with_prefix: bool,
    with_cursor: bool,
) -> String {
    let order_column = order_column(order_by);

    let direction = match sort_by {
        SortBy::Asc => "asc",
        SortBy::Desc => "desc",
    };

    let mut conditions: Vec<String> = Vec::with_capacity(2);

    if with_prefix {
        conditions.push("queue_name like ? escape '\\'".to_string());
    }

    if with_cursor {
        let comparison = match sort_by {
            SortBy::Asc => ">",
            SortBy::Desc => "<",
        };

        conditions.push(format!("{order_column} {comparison} ?"));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" where {}", conditions.join(" and "))
    };

    format!(
        "select {PROPS_COLUMNS} from queue_properties{where_clause} \
         order by {order_column} {direction} limit ?"
    )
}

pub(crate) fn order_column(order_by: OrderBy) -> &'static str {
    match order_by {
        OrderBy::Id => "queue_id",
        OrderBy::Name => "queue_name",
        OrderBy::CreatedAt => "created_at",
    }
}

/// Escapes LIKE metacharacters in a name prefix and appends the wildcard.
pub(crate) fn like_prefix(prefix: &str) -> String {
    let mut escaped = String::with_capacity(prefix.len() + 1);

    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }

        escaped.push(c);
    }

    escaped.push('%');
    escaped
}
