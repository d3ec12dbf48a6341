/// Read-through caching over a [`Cache`](crate::db::Cache).
///
/// Returns the cached value for `$key` when present. A failed cache read is
/// logged and treated as a miss. Otherwise awaits
/// `$block` (a future resolving to `AppResult<T>`), queues the value for a
/// background write with `$ttl` seconds to live, and returns it.
///
/// Must be used inside a function returning `AppResult<T>`.
///
/// ```rust,ignore
/// let car: Car = cached!(cache, CacheKey::CarDetail(id.clone()), 300, async {
///     load_car(&store, &id).await
/// })?;
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        let hit = match $cache.get_from_cache(&$key).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::warn!(key = %$key, error = %e, "Cache read failed, falling back to source");
                None
            }
        };

        match hit {
            Some(cached) => Ok(cached),
            None => {
                let value = $block.await?;
                $cache.set_in_background(&$key, &value, $ttl);
                Ok(value)
            }
        }
    }};
}
