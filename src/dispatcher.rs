//! Job dispatch: packs the working set into a multipart request, sends it to
//! the operation's endpoint and hands the body to the materializer.
//!
//! Exactly one request is sent per [`Dispatcher::submit`] call and nothing is
//! retried. While the request is outstanding a ticker bumps the progress
//! estimate toward the configured ceiling; the ticker is stopped and the
//! estimate forced to 100 before `submit` returns, on every path.

use reqwest::{
    Client, Url,
    header::CONTENT_TYPE,
    multipart::{Form, Part},
};
use std::{sync::Arc, time::Instant};
use tokio::{sync::watch, task::JoinHandle};
use tokio_util::sync::CancellationToken;

use crate::{
    config::{Config, ProgressCfg},
    error::{CaptureError, Result},
    jobs::Job,
    materializer::{self, ResultPayload},
    media::MediaItem,
    operation::Operation,
};

/// Progress estimate shared with whoever renders it.
pub type ProgressTx = Arc<watch::Sender<u8>>;

/// Sends jobs to the processing server.
#[derive(Clone)]
pub struct Dispatcher {
    http: Client,
    base_url: String,
    field_name: String,
    progress: ProgressCfg,
}

impl Dispatcher {
    pub fn new(http: Client, cfg: &Config) -> Self {
        Self {
            http,
            base_url: cfg.server.base_url.clone(),
            field_name: cfg.server.upload_field.clone(),
            progress: cfg.progress.clone(),
        }
    }

    /// Build the HTTP client from config, including the optional timeout.
    pub fn from_config(cfg: &Config) -> anyhow::Result<Self> {
        let mut builder = Client::builder();
        if let Some(t) = cfg.server.timeout() {
            builder = builder.timeout(t);
        }
        Ok(Self::new(builder.build()?, cfg))
    }

    /// Run one job to a terminal state.
    ///
    /// `items` is only read. The returned job is never pending.
    pub async fn submit(
        &self,
        op: Operation,
        items: &[MediaItem],
        progress: &ProgressTx,
        cancel: &CancellationToken,
    ) -> Job {
        let mut job = Job::new(op, items.len());
        progress.send_replace(job.progress);
        tracing::info!(
            "job {} start: {} ({} files) -> {}",
            job.id,
            op,
            items.len(),
            op.endpoint(&self.base_url)
        );
        let started = Instant::now();

        let ticker = ProgressTicker::start(Arc::clone(progress), &self.progress);
        let outcome = tokio::select! {
            r = self.execute(op, items) => r,
            _ = cancel.cancelled() => Err(CaptureError::Cancelled),
        };
        ticker.stop();

        match outcome {
            Ok(payload) => {
                tracing::info!(
                    "job {} succeeded: {} ({}) in {:?}",
                    job.id,
                    op,
                    payload.summary(),
                    started.elapsed()
                );
                job.succeed(payload);
            }
            Err(e) => {
                tracing::error!("job {} failed: {}: {e} in {:?}", job.id, op, started.elapsed());
                job.fail(&e);
            }
        }
        progress.send_replace(100);
        job
    }

    /// Send the request and materialize the full body.
    async fn execute(&self, op: Operation, items: &[MediaItem]) -> Result<ResultPayload> {
        let url = self.url_for(op)?;
        let form = self.form(items)?;

        let resp = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(CaptureError::Transport)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(CaptureError::Rejected {
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned);
        // Only a complete body is handed on.
        let body = resp.bytes().await.map_err(CaptureError::Transport)?;
        tracing::debug!("{}: received {} bytes", op, body.len());

        materializer::materialize(op, content_type.as_deref(), body.to_vec())
    }

    fn url_for(&self, op: Operation) -> Result<Url> {
        let url = op.endpoint(&self.base_url);
        Url::parse(&url).map_err(|e| CaptureError::Endpoint {
            reason: e.to_string(),
            url,
        })
    }

    /// Every item under the shared field name, in working-set order.
    fn form(&self, items: &[MediaItem]) -> Result<Form> {
        let mut form = Form::new();
        for item in items {
            let part = Part::bytes(item.content.to_vec())
                .file_name(item.name.clone())
                .mime_str(&item.mime)
                .map_err(CaptureError::Transport)?;
            form = form.part(self.field_name.clone(), part);
        }
        Ok(form)
    }
}

/// Recurring estimate bump; aborted when stopped or dropped.
struct ProgressTicker {
    handle: JoinHandle<()>,
}

impl ProgressTicker {
    fn start(progress: ProgressTx, cfg: &ProgressCfg) -> Self {
        let tick = cfg.tick();
        let ceiling = cfg.ceiling();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            // The first tick fires immediately.
            interval.tick().await;
            loop {
                interval.tick().await;
                progress.send_if_modified(|p| {
                    if *p < ceiling {
                        *p += 1;
                        true
                    } else {
                        false
                    }
                });
            }
        });
        Self { handle }
    }

    fn stop(self) {}
}

impl Drop for ProgressTicker {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::FailureKind, jobs::JobStatus, materializer::tests::zip_of, media::WorkingSet,
    };
    use axum::{
        Router,
        body::Bytes,
        extract::{Multipart, State},
        http::{HeaderMap, StatusCode, header},
        response::{IntoResponse, Response},
        routing::post,
    };
    use std::{
        sync::Mutex,
        time::Duration,
    };

    /// (field name, file name, size) of every uploaded part.
    #[derive(Clone, Default)]
    struct Uploads(Arc<Mutex<Vec<(String, String, usize)>>>);

    impl Uploads {
        fn take(&self) -> Vec<(String, String, usize)> {
            std::mem::take(&mut *self.0.lock().unwrap())
        }
    }

    async fn spawn_server(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn dispatcher(base_url: &str) -> Dispatcher {
        let mut cfg = Config::default();
        cfg.server.base_url = base_url.to_string();
        cfg.progress.tick_ms = 5;
        Dispatcher::new(Client::new(), &cfg)
    }

    fn progress() -> ProgressTx {
        Arc::new(watch::channel(0u8).0)
    }

    async fn record(uploads: &Uploads, mut mp: Multipart) {
        while let Some(field) = mp.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            let file = field.file_name().unwrap_or_default().to_string();
            let data = field.bytes().await.unwrap();
            uploads.0.lock().unwrap().push((name, file, data.len()));
        }
    }

    fn zip_response(body: Vec<u8>) -> Response {
        ([(header::CONTENT_TYPE, "application/zip")], body).into_response()
    }

    fn clip() -> WorkingSet {
        let mut set = WorkingSet::default();
        set.add_files([MediaItem::from_bytes("clip1.mp4", vec![0u8; 64])]);
        set
    }

    #[tokio::test]
    async fn test_extract_source_code_end_to_end() {
        let uploads = Uploads::default();
        let router = Router::new()
            .route(
                "/api/extract_source_code/",
                post(|State(u): State<Uploads>, mp: Multipart| async move {
                    record(&u, mp).await;
                    zip_response(zip_of(&[
                        ("main.py", "print('hi')\n"),
                        ("utils.py", "def f():\n    pass\n"),
                    ]))
                }),
            )
            .with_state(uploads.clone());
        let base = spawn_server(router).await;

        let set = clip();
        let tx = progress();
        let job = dispatcher(&base)
            .submit(
                Operation::ExtractSourceCode,
                &set.snapshot(),
                &tx,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.progress, 100);
        assert_eq!(*tx.borrow(), 100);
        assert_eq!(
            uploads.take(),
            vec![("videos".to_string(), "clip1.mp4".to_string(), 64)]
        );

        let Some(payload) = job.result.as_deref() else {
            panic!("no payload");
        };
        let ResultPayload::Archive(archive) = payload else {
            panic!("expected archive");
        };
        assert_eq!(archive.entry_names(), &["main.py", "utils.py"]);
        assert_eq!(archive.read_entry("main.py").unwrap(), b"print('hi')\n");
        assert_eq!(
            archive.read_entry("utils.py").unwrap(),
            b"def f():\n    pass\n"
        );
    }

    #[tokio::test]
    async fn test_transcribe_structured_end_to_end() {
        let router = Router::new().route(
            "/api/transcribe_video/",
            post(|_mp: Multipart| async {
                (
                    [(header::CONTENT_TYPE, "application/json")],
                    r#"[{"filename":"clip1.txt","content":"hello world"}]"#,
                )
            }),
        );
        let base = spawn_server(router).await;

        let job = dispatcher(&base)
            .submit(
                Operation::TranscribeVideo,
                &clip().snapshot(),
                &progress(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(job.status, JobStatus::Succeeded);
        let payload = job.result.unwrap();
        let ResultPayload::Structured(s) = &*payload else {
            panic!("expected structured");
        };
        assert_eq!(s.combined(), "hello world");
        assert_eq!(s.records()[0].filename, "clip1.txt");
    }

    #[tokio::test]
    async fn test_files_sent_in_working_set_order() {
        let uploads = Uploads::default();
        let router = Router::new()
            .route(
                "/api/generate_all/",
                post(|State(u): State<Uploads>, mp: Multipart| async move {
                    record(&u, mp).await;
                    zip_response(zip_of(&[("summary.txt", "s")]))
                }),
            )
            .with_state(uploads.clone());
        let base = spawn_server(router).await;

        let mut set = WorkingSet::default();
        let b = MediaItem::from_bytes("b.mp4", vec![1u8; 2]);
        set.add_files([
            MediaItem::from_bytes("c.mp4", vec![1u8; 3]),
            b.clone(),
            MediaItem::from_bytes("a.mov", vec![1u8; 1]),
            MediaItem::from_bytes("c.mp4", vec![1u8; 4]),
        ]);
        set.remove_file(b.id);

        let job = dispatcher(&base)
            .submit(
                Operation::GenerateAll,
                &set.snapshot(),
                &progress(),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(job.status, JobStatus::Succeeded);

        let got: Vec<_> = uploads
            .take()
            .into_iter()
            .map(|(field, file, size)| {
                assert_eq!(field, "videos");
                (file, size)
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("c.mp4".to_string(), 3),
                ("a.mov".to_string(), 1),
                ("c.mp4".to_string(), 4)
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_working_set_sends_well_formed_request() {
        let seen = Arc::new(Mutex::new(None::<(String, String)>));
        let router = Router::new()
            .route(
                "/api/generate_notes/",
                post(
                    |State(seen): State<Arc<Mutex<Option<(String, String)>>>>,
                     headers: HeaderMap,
                     body: Bytes| async move {
                        let ct = headers
                            .get(header::CONTENT_TYPE)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        *seen.lock().unwrap() =
                            Some((ct, String::from_utf8_lossy(&body).into_owned()));
                        zip_response(zip_of(&[]))
                    },
                ),
            )
            .with_state(Arc::clone(&seen));
        let base = spawn_server(router).await;

        let job = dispatcher(&base)
            .submit(
                Operation::GenerateImageNotes,
                &[],
                &progress(),
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(job.status, JobStatus::Succeeded);
        assert_eq!(job.item_count, 0);
        let ResultPayload::Archive(a) = job.result.as_deref().unwrap() else {
            panic!("expected archive");
        };
        assert!(a.entry_names().is_empty());

        let (ct, body) = seen.lock().unwrap().clone().unwrap();
        assert!(ct.starts_with("multipart/form-data; boundary="));
        assert!(!body.contains("filename="));
    }

    #[tokio::test]
    async fn test_server_rejection_fails_job_without_payload() {
        let router = Router::new().route(
            "/api/extract_workflow/",
            post(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
        );
        let base = spawn_server(router).await;
        let tx = progress();

        let job = dispatcher(&base)
            .submit(
                Operation::GenerateWorkflow,
                &clip().snapshot(),
                &tx,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            job.status,
            JobStatus::Failed {
                kind: FailureKind::OperationFailed,
                ..
            }
        ));
        assert!(job.result.is_none());
        assert_eq!(*tx.borrow(), 100);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_failure() {
        // Reserve a port, then close it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let job = dispatcher(&format!("http://{addr}/api"))
            .submit(
                Operation::GenerateSummary,
                &clip().snapshot(),
                &progress(),
                &CancellationToken::new(),
            )
            .await;

        let JobStatus::Failed { kind, message } = &job.status else {
            panic!("expected failure");
        };
        assert_eq!(*kind, FailureKind::OperationFailed);
        assert!(message.starts_with("transport failure"));
        assert_eq!(job.progress, 100);
    }

    /// Log sink shared with a thread-local subscriber.
    #[derive(Clone, Default)]
    struct LogCapture(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for LogCapture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_failed_job_logs_elapsed_time() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let capture = LogCapture::default();
        let writer = capture.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let job = dispatcher(&format!("http://{addr}/api"))
            .submit(
                Operation::GenerateWorkflow,
                &clip().snapshot(),
                &progress(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(job.status, JobStatus::Failed { .. }));

        let log = String::from_utf8(capture.0.lock().unwrap().clone()).unwrap();
        let line = log
            .lines()
            .find(|l| l.contains(&format!("job {} failed", job.id)))
            .unwrap();
        assert!(line.contains(" in "));
        assert!(line.trim_end().ends_with('s'));
    }

    #[tokio::test]
    async fn test_garbage_body_is_distinct_materialize_failure() {
        let router = Router::new().route(
            "/api/extract_source_code/",
            post(|| async { ([(header::CONTENT_TYPE, "text/html")], "<html>not a zip</html>") }),
        );
        let base = spawn_server(router).await;

        let job = dispatcher(&base)
            .submit(
                Operation::ExtractSourceCode,
                &clip().snapshot(),
                &progress(),
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            job.status,
            JobStatus::Failed {
                kind: FailureKind::BadResult,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_cancel_aborts_request_and_stops_ticker() {
        let router = Router::new().route(
            "/api/generate_all/",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                zip_response(zip_of(&[]))
            }),
        );
        let base = spawn_server(router).await;
        let tx = progress();
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let job = dispatcher(&base)
            .submit(Operation::GenerateAll, &clip().snapshot(), &tx, &cancel)
            .await;

        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            job.status,
            JobStatus::Failed {
                kind: FailureKind::Cancelled,
                ..
            }
        ));

        // A live ticker would move this off zero.
        tx.send_replace(0);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(*tx.borrow(), 0);
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_capped_until_response() {
        let router = Router::new().route(
            "/api/summarize_video/",
            post(|| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                zip_response(zip_of(&[("summary.txt", "ok")]))
            }),
        );
        let base = spawn_server(router).await;

        let mut cfg = Config::default();
        cfg.server.base_url = base;
        cfg.progress.tick_ms = 5;
        cfg.progress.ceiling = 10;
        let dispatcher = Dispatcher::new(Client::new(), &cfg);

        let tx = progress();
        let mut rx = tx.subscribe();
        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let v = *rx.borrow_and_update();
                seen.push(v);
                if v == 100 {
                    break;
                }
            }
            seen
        });

        let job = dispatcher
            .submit(
                Operation::GenerateSummary,
                &clip().snapshot(),
                &tx,
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(job.status, JobStatus::Succeeded);

        let seen = watcher.await.unwrap();
        let (last, before) = seen.split_last().unwrap();
        assert_eq!(*last, 100);
        assert!(before.iter().all(|v| *v <= 10));
        assert!(before.windows(2).all(|w| w[0] <= w[1]));
        assert!(before.contains(&10));

        tx.send_replace(0);
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(*tx.borrow(), 0);
    }
}
