#[cfg(feature = "tokio")]
pub async fn spawn_blocking<F, T>(f: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    match tokio::runtime::Handle::try_current() {
        Ok(handle) => handle.spawn_blocking(f).await.map_err(|e| e.to_string()),
        // driven by a plain executor, e.g. `FlatMapIndex::blocking_cardinality`
        Err(_) => Ok(f()),
    }
}

#[cfg(all(feature = "async-std", not(feature = "tokio")))]
pub async fn spawn_blocking<F, T>(f: F) -> Result<T, String>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(async_std::task::spawn_blocking(f).await)
}

#[cfg(any(feature = "async-std", feature = "tokio"))]
pub fn available_parallelism() -> usize {
    std::cmp::max(num_cpus::get(), 1)
}
