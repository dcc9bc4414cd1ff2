use std::sync::Arc;

use crate::config::{Settings, TemplateConfig};
use crate::output::{Output, OutputError};

/// Invoked when the transport reports an unrecoverable failure
pub type FatalHandler = Arc<dyn Fn(&OutputError) + Send + Sync>;

#[derive(Clone)]
pub struct AppState {
    pub output: Arc<dyn Output>,
    pub templates: Arc<TemplateConfig>,
    /// Dump decoded payloads to stderr
    pub debug: bool,
    pub body_limit: usize,
    pub on_fatal: FatalHandler,
}

impl AppState {
    pub fn new(settings: &Settings, output: Arc<dyn Output>) -> Self {
        Self {
            output,
            templates: Arc::new(settings.templates.clone()),
            debug: settings.server.debug,
            body_limit: settings.server.body_limit_bytes,
            on_fatal: Arc::new(exit_process),
        }
    }

    pub fn with_fatal_handler(mut self, handler: FatalHandler) -> Self {
        self.on_fatal = handler;
        self
    }
}

/// Default fatal hook: the process is expected to run under a supervisor
/// that restarts it.
pub fn exit_process(error: &OutputError) {
    tracing::error!(error = %error, "Output is unusable, exiting");
    std::process::exit(1);
}
