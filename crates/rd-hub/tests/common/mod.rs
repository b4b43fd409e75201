pub mod mock_ws;

use std::time::Duration;

/// Poll `condition` until it holds or two seconds pass.
pub async fn wait_until<F>(condition: F) -> bool
where
    F: Fn() -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
