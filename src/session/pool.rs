use sha2::{Digest, Sha256};

use crate::dispatch;
use crate::protocol::ErrorKind;

use super::*;

impl SessionPool {
    /// Creates a pool holding up to 100 sessions, evicting after 5 minutes
    /// of inactivity.
    pub fn new() -> Self {
        let cache = Cache::builder()
            .max_capacity(100)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build();
        Self { cache }
    }

    /// Credential digest for reuse checks. Passwords are never kept in the
    /// clear on a pooled session.
    fn fingerprint(request: &CliRequest) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(request.auth.username.as_bytes());
        hasher.update([0u8]);
        hasher.update(request.auth.password.as_bytes());
        hasher.finalize().into()
    }

    /// Runs a request on a pooled session, opening a new one when no
    /// healthy, credential-matching session exists for the device.
    pub async fn execute(&self, request: CliRequest) -> CliResponse {
        let deadline = dispatch::overall_deadline(&request);
        let sender = match self.session_sender(&request).await {
            Ok(sender) => sender,
            Err(err) => return CliResponse::from_error(err.kind(), err.to_string()),
        };

        let (tx, rx) = oneshot::channel();
        let job = PoolJob {
            request,
            responder: tx,
        };
        if sender.send(job).await.is_err() {
            return CliResponse::from_error(ErrorKind::Internal, "pooled session worker is gone");
        }
        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                CliResponse::from_error(ErrorKind::Internal, "pooled session dropped the request")
            }
            Err(_) => {
                let err = CliError::Cancelled(format!("request deadline of {deadline:?} exceeded"));
                CliResponse::from_error(err.kind(), err.to_string())
            }
        }
    }

    async fn session_sender(
        &self,
        request: &CliRequest,
    ) -> Result<mpsc::Sender<PoolJob>, CliError> {
        let key = request.device_addr();
        let fingerprint = Self::fingerprint(request);

        if let Some((sender, session)) = self.cache.get(&key).await {
            let guard = session.read().await;
            if guard.driver.is_connected() && guard.fingerprint == fingerprint {
                debug!("pool hit: {key}");
                return Ok(sender);
            }
            debug!("pool entry for {key} is stale, reconnecting");
            drop(guard);
            self.cache.invalidate(&key).await;
        }

        let driver = dispatch::open_session(request).await?;
        let session = Arc::new(RwLock::new(PooledSession {
            driver,
            fingerprint,
        }));

        let (tx, mut rx) = mpsc::channel::<PoolJob>(32);
        let worker_session = session.clone();
        let worker_key = key.clone();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                if !worker_session.read().await.driver.is_connected() {
                    let _ = job.responder.send(CliResponse::from_error(
                        ErrorKind::TransportOpen,
                        "pooled connection closed",
                    ));
                    break;
                }
                let response = {
                    let mut guard = worker_session.write().await;
                    guard.driver.execute(&job.request).await
                };
                let _ = job.responder.send(response);
            }
            debug!("pool worker for {worker_key} stopped");
        });

        self.cache.insert(key.clone(), (tx.clone(), session)).await;
        debug!("new pooled session for {key}");
        Ok(tx)
    }
}

impl Default for SessionPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Auth;

    fn request(password: &str) -> CliRequest {
        CliRequest {
            device_type: "cisco.ios.c2960".to_string(),
            address: "192.0.2.1".to_string(),
            port: 22,
            auth: Auth {
                username: "admin".to_string(),
                password: password.to_string(),
            },
            mode: "login_enable".to_string(),
            commands: vec![],
            timeout: None,
            log_prefix: "[test]".to_string(),
        }
    }

    #[test]
    fn fingerprint_changes_with_credentials() {
        let a = SessionPool::fingerprint(&request("secret"));
        let b = SessionPool::fingerprint(&request("secret"));
        let c = SessionPool::fingerprint(&request("other"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
