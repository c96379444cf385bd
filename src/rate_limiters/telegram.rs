use log::warn;
use std::future::IntoFuture;
use teloxide::RequestError;
use tokio::time::sleep;

/// retries allowed after a flood-wait
const MAX_FLOOD_RETRIES: usize = 1;

/// runs a telegram request, honouring `RetryAfter` by sleeping the requested
/// time and trying again
pub async fn with_flood_retry<T, Fut>(mut op: impl FnMut() -> Fut) -> Result<T, RequestError>
where
    Fut: IntoFuture<Output = Result<T, RequestError>>,
{
    let mut attempts = 0usize;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(RequestError::RetryAfter(wait)) if attempts < MAX_FLOOD_RETRIES => {
                attempts += 1;
                warn!(
                    "Telegram flood wait: sleeping {}s before retrying",
                    wait.duration().as_secs()
                );
                sleep(wait.duration()).await;
            }
            Err(e) => return Err(e),
        }
    }
}
