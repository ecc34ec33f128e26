use std::io::{self, Write};
use std::sync::{Arc, Mutex, Once};

use tracing::Subscriber;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::{WmgConfig, AI_AUDIT_TARGET};

static TRACING_INIT: Once = Once::new();

struct MutexFileMakeWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl<'a> MakeWriter<'a> for MutexFileMakeWriter {
    type Writer = MutexFileWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        MutexFileWriter {
            // A poisoned lock only means another thread panicked mid-write; keep logging.
            guard: self.file.lock().unwrap_or_else(|poisoned| poisoned.into_inner()),
        }
    }
}

struct MutexFileWriter<'a> {
    guard: std::sync::MutexGuard<'a, std::fs::File>,
}

impl Write for MutexFileWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.guard.flush()
    }
}

fn open_append(path: &std::path::Path, owner_only: bool) -> Option<Arc<Mutex<std::fs::File>>> {
    let mut options = std::fs::OpenOptions::new();
    options.create(true).append(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;

        // Audit logs hold prompts and model output even after redaction.
        if owner_only {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = owner_only;

    options.open(path).ok().map(|file| Arc::new(Mutex::new(file)))
}

/// Which events a layer sees, split on the [`AI_AUDIT_TARGET`] target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuditRouting {
    All,
    WithoutAudit,
    AuditOnly,
}

fn route_audit<S, L>(layer: L, routing: AuditRouting) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + 'static,
    L: Layer<S> + Send + Sync + 'static,
{
    let audit_only = match routing {
        AuditRouting::All => return layer.boxed(),
        AuditRouting::WithoutAudit => false,
        AuditRouting::AuditOnly => true,
    };
    layer
        .with_filter(filter_fn(move |meta| {
            (meta.target() == AI_AUDIT_TARGET) == audit_only
        }))
        .boxed()
}

/// Installs the global `tracing` subscriber.
///
/// Safe to call multiple times; only the first call has any effect. When
/// `ai.audit_log.enabled` is set, events with target [`AI_AUDIT_TARGET`] are routed to a
/// dedicated JSON file and kept out of the regular log output.
pub fn init_tracing(config: &WmgConfig) {
    TRACING_INIT.call_once(|| {
        let logging = &config.logging;
        let mut filter = logging.env_filter();

        let audit_path = config
            .ai
            .audit_log
            .enabled
            .then(|| config.ai.audit_log.resolved_path());
        let audit_file = audit_path
            .as_deref()
            .and_then(|path| open_append(path, true));
        let audit_enabled = audit_path.is_some();
        if audit_enabled {
            if let Ok(directive) = format!("{AI_AUDIT_TARGET}=info").parse() {
                filter = filter.add_directive(directive);
            }
        }

        let mut make_writer: Option<BoxMakeWriter> = None;
        if logging.stderr {
            // Debug builds go through `TestWriter` so `cargo test` captures the output.
            let stderr = if cfg!(debug_assertions) {
                BoxMakeWriter::new(tracing_subscriber::fmt::writer::TestWriter::with_stderr)
            } else {
                BoxMakeWriter::new(std::io::stderr)
            };
            make_writer = Some(stderr);
        }
        let base_file_failed = match logging.file.as_deref() {
            Some(path) => match open_append(path, false) {
                Some(file) => {
                    let file_writer = BoxMakeWriter::new(MutexFileMakeWriter { file });
                    make_writer = Some(match make_writer.take() {
                        Some(prev) => BoxMakeWriter::new(prev.and(file_writer)),
                        None => file_writer,
                    });
                    false
                }
                None => true,
            },
            None => false,
        };
        let make_writer = make_writer.unwrap_or_else(|| BoxMakeWriter::new(std::io::sink));

        let base_routing = if audit_enabled {
            AuditRouting::WithoutAudit
        } else {
            AuditRouting::All
        };
        let base_layer: Box<dyn Layer<_> + Send + Sync> = if logging.json {
            route_audit(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(make_writer)
                    .with_ansi(false),
                base_routing,
            )
        } else {
            route_audit(
                tracing_subscriber::fmt::layer()
                    .with_writer(make_writer)
                    .with_ansi(false),
                base_routing,
            )
        };

        let audit_layer: Box<dyn Layer<_> + Send + Sync> = match audit_file.clone() {
            Some(file) => route_audit(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(MutexFileMakeWriter { file })
                    .with_ansi(false),
                AuditRouting::AuditOnly,
            ),
            None => tracing_subscriber::layer::Identity::new().boxed(),
        };

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(base_layer)
            .with(audit_layer);
        if tracing::subscriber::set_global_default(subscriber).is_ok() {
            if base_file_failed {
                if let Some(path) = logging.file.as_ref() {
                    tracing::warn!(
                        target: "wmg.config",
                        path = %path.display(),
                        "failed to open log file; file logging disabled"
                    );
                }
            }
            if audit_enabled && audit_file.is_none() {
                if let Some(path) = audit_path.as_ref() {
                    tracing::warn!(
                        target: "wmg.config",
                        path = %path.display(),
                        "failed to open AI audit log file; audit events will be dropped"
                    );
                }
            }
        }
    });
}
