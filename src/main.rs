mod app;
mod feed;
mod mesh;
mod settings;
mod util;

use std::path::PathBuf;
use std::sync::{Arc, mpsc};
use std::time::Duration;

use anyhow::{Result, anyhow};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::feed::{FeedPoller, HttpSource, PollSchedule, SnapshotSource};
use crate::mesh::{MeshPolicy, MeshSynchronizer};
use crate::settings::{
    FileSettingsStore, RemoteSettingsStore, SAVE_DEBOUNCE, SettingsPersister, SettingsStore,
    load_settings,
};

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Base URL serving the agent roster, message history and settings endpoints.
    #[arg(long, default_value = "http://127.0.0.1:8080")]
    base_url: String,
    /// Keep overrides in a local JSON file instead of the remote settings endpoint.
    #[arg(long)]
    settings_file: Option<PathBuf>,
    #[arg(long, default_value_t = 5_000)]
    agents_interval_ms: u64,
    #[arg(long, default_value_t = 4_000)]
    history_interval_ms: u64,
    #[arg(long, default_value_t = 20)]
    history_limit: usize,
    /// Agents not seen within this many hours are dropped.
    #[arg(long, default_value_t = mesh::DEFAULT_LIVENESS_HOURS)]
    liveness_hours: i64,
    #[arg(long)]
    hub_pattern: Option<String>,
    #[arg(long)]
    local_pattern: Option<String>,
    /// Agent id treated as control plane; repeat for several.
    #[arg(long = "control-plane-id")]
    control_plane_ids: Vec<String>,
    /// Operator allowed to run root agents; repeat for several.
    #[arg(long = "root-operator")]
    root_operators: Vec<String>,
}

impl Args {
    fn policy(&self) -> MeshPolicy {
        let mut policy = MeshPolicy {
            liveness_window: chrono::Duration::hours(self.liveness_hours.max(0)),
            ..MeshPolicy::default()
        };
        if let Some(pattern) = &self.hub_pattern {
            policy.hub_pattern = pattern.clone();
        }
        if let Some(pattern) = &self.local_pattern {
            policy.local_pattern = pattern.clone();
        }
        if !self.control_plane_ids.is_empty() {
            policy.control_plane_ids = self.control_plane_ids.clone();
        }
        if !self.root_operators.is_empty() {
            policy.root_operators = self.root_operators.clone();
        }
        policy
    }

    fn schedule(&self) -> PollSchedule {
        PollSchedule {
            agents_interval: Duration::from_millis(self.agents_interval_ms.max(1)),
            history_interval: Duration::from_millis(self.history_interval_ms.max(1)),
            history_limit: self.history_limit,
        }
    }

    fn settings_store(&self) -> Result<Arc<dyn SettingsStore>> {
        Ok(match &self.settings_file {
            Some(path) => Arc::new(FileSettingsStore::new(path.clone())),
            None => Arc::new(RemoteSettingsStore::new(&self.base_url, HTTP_TIMEOUT)?),
        })
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    init_logging();
    let args = Args::parse();

    let policy = args.policy();
    let schedule = args.schedule();
    let source: Arc<dyn SnapshotSource> = Arc::new(HttpSource::new(&args.base_url, HTTP_TIMEOUT)?);
    let store = args.settings_store()?;
    info!(
        base_url = %args.base_url,
        settings = %store.describe(),
        "starting mesh-visor"
    );

    let settings = load_settings(store.as_ref());
    let persister = SettingsPersister::new(store, SAVE_DEBOUNCE);
    let synchronizer = MeshSynchronizer::new(policy);

    let options = eframe::NativeOptions {
        viewport: eframe::egui::ViewportBuilder::default().with_inner_size([1440.0, 920.0]),
        ..Default::default()
    };

    eframe::run_native(
        "mesh-visor",
        options,
        Box::new(move |cc| {
            let (sender, updates) = mpsc::channel();
            let repaint = cc.egui_ctx.clone();
            let poller = FeedPoller::spawn(source, schedule, sender, move || {
                repaint.request_repaint();
            })?;

            Ok(Box::new(app::MeshApp::new(
                synchronizer,
                updates,
                poller,
                settings,
                persister,
            )))
        }),
    )
    .map_err(|err| anyhow!("viewer exited with an error: {err}"))
}
