use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::mesh::MeshSettings;

pub const SETTINGS_KEY: &str = "mesh_v1";
pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Persists the settings blob as opaque text under a single key.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, blob: &str) -> Result<()>;
    fn describe(&self) -> String;
}

pub struct FileSettingsStore {
    path: PathBuf,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SettingsStore for FileSettingsStore {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        fs::read_to_string(&self.path)
            .map(Some)
            .with_context(|| format!("failed to read settings from {}", self.path.display()))
    }

    fn save(&self, blob: &str) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, blob)
            .with_context(|| format!("failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path)
            .with_context(|| format!("failed to replace {}", self.path.display()))
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

#[derive(Deserialize)]
struct StoredValue {
    #[serde(default)]
    value: Option<String>,
}

#[derive(Serialize)]
struct StoreRequest<'a> {
    key: &'a str,
    value: &'a str,
}

/// Settings kept by the mesh control plane's key-value endpoint.
pub struct RemoteSettingsStore {
    client: Client,
    base_url: String,
}

impl RemoteSettingsStore {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client for settings")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
        })
    }
}

impl SettingsStore for RemoteSettingsStore {
    fn load(&self) -> Result<Option<String>> {
        let url = format!("{}/api/settings/{SETTINGS_KEY}", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .with_context(|| format!("failed to request {url}"))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(anyhow!("{url} answered with status {}", response.status()));
        }

        let stored: StoredValue = response
            .json()
            .with_context(|| format!("invalid settings payload from {url}"))?;
        Ok(stored.value)
    }

    fn save(&self, blob: &str) -> Result<()> {
        let url = format!("{}/api/settings", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&StoreRequest {
                key: SETTINGS_KEY,
                value: blob,
            })
            .send()
            .with_context(|| format!("failed to post settings to {url}"))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(anyhow!("{url} answered with status {}", response.status()))
        }
    }

    fn describe(&self) -> String {
        format!("{}/api/settings/{SETTINGS_KEY}", self.base_url)
    }
}

/// Loads settings once at startup, falling back to defaults on any failure.
pub fn load_settings(store: &dyn SettingsStore) -> MeshSettings {
    let blob = match store.load() {
        Ok(Some(blob)) => blob,
        Ok(None) => {
            info!(store = %store.describe(), "no stored mesh settings, using defaults");
            return MeshSettings::default();
        }
        Err(error) => {
            warn!(store = %store.describe(), error = %format!("{error:#}"), "failed to load mesh settings");
            return MeshSettings::default();
        }
    };

    match MeshSettings::from_blob(&blob) {
        Ok(settings) => {
            info!(
                store = %store.describe(),
                overrides = settings.node_overrides.len(),
                "loaded mesh settings"
            );
            settings
        }
        Err(error) => {
            warn!(store = %store.describe(), error = %format!("{error:#}"), "stored mesh settings are unreadable");
            MeshSettings::default()
        }
    }
}

/// Debounces saves: every change pushes the deadline back, and only the
/// settings current at the deadline are written.
pub struct SettingsPersister {
    store: Arc<dyn SettingsStore>,
    debounce: Duration,
    due: Option<Instant>,
}

impl SettingsPersister {
    pub fn new(store: Arc<dyn SettingsStore>, debounce: Duration) -> Self {
        Self {
            store,
            debounce,
            due: None,
        }
    }

    pub fn mark_changed(&mut self, now: Instant) {
        self.due = Some(now + self.debounce);
    }

    pub fn is_pending(&self) -> bool {
        self.due.is_some()
    }

    pub fn time_until_due(&self, now: Instant) -> Option<Duration> {
        self.due.map(|due| due.saturating_duration_since(now))
    }

    /// Starts a background save once the debounce window has passed.
    pub fn poll(&mut self, now: Instant, settings: &MeshSettings) -> Option<JoinHandle<()>> {
        let due = self.due?;
        if now < due {
            return None;
        }
        self.due = None;

        let blob = match settings.to_blob() {
            Ok(blob) => blob,
            Err(error) => {
                warn!(error = %format!("{error:#}"), "cannot serialize mesh settings");
                return None;
            }
        };

        let store = Arc::clone(&self.store);
        let spawned = thread::Builder::new()
            .name("settings-save".to_owned())
            .spawn(move || save_blob(store.as_ref(), &blob));
        match spawned {
            Ok(handle) => Some(handle),
            Err(error) => {
                warn!(%error, "failed to spawn settings writer");
                None
            }
        }
    }

    /// Writes pending changes synchronously, used on shutdown.
    pub fn flush(&mut self, settings: &MeshSettings) {
        if self.due.take().is_none() {
            return;
        }

        match settings.to_blob() {
            Ok(blob) => save_blob(self.store.as_ref(), &blob),
            Err(error) => warn!(error = %format!("{error:#}"), "cannot serialize mesh settings"),
        }
    }
}

fn save_blob(store: &dyn SettingsStore, blob: &str) {
    match store.save(blob) {
        Ok(()) => debug!(store = %store.describe(), bytes = blob.len(), "saved mesh settings"),
        Err(error) => {
            warn!(store = %store.describe(), error = %format!("{error:#}"), "failed to save mesh settings")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingStore {
        saved: Mutex<Vec<String>>,
    }

    impl SettingsStore for RecordingStore {
        fn load(&self) -> Result<Option<String>> {
            Ok(None)
        }

        fn save(&self, blob: &str) -> Result<()> {
            self.saved.lock().expect("saved lock").push(blob.to_owned());
            Ok(())
        }

        fn describe(&self) -> String {
            "memory".to_owned()
        }
    }

    struct BrokenStore;

    impl SettingsStore for BrokenStore {
        fn load(&self) -> Result<Option<String>> {
            Err(anyhow!("disk on fire"))
        }

        fn save(&self, _blob: &str) -> Result<()> {
            Err(anyhow!("disk on fire"))
        }

        fn describe(&self) -> String {
            "broken".to_owned()
        }
    }

    #[test]
    fn file_store_round_trips_settings() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = FileSettingsStore::new(dir.path().join("nested").join("mesh.json"));
        assert!(store.load().expect("load missing").is_none());

        let mut settings = MeshSettings::default();
        settings.node_override_mut("a1").name = Some("Scout".to_owned());
        store.save(&settings.to_blob().expect("blob")).expect("save");

        assert_eq!(load_settings(&store), settings);
        assert!(!store.path().with_extension("json.tmp").exists());
    }

    #[test]
    fn unreadable_blob_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("mesh.json");
        fs::write(&path, "{ this is not json").expect("write garbage");

        assert_eq!(load_settings(&FileSettingsStore::new(path)), MeshSettings::default());
        assert_eq!(load_settings(&BrokenStore), MeshSettings::default());
    }

    #[test]
    fn saves_wait_for_the_debounce_window() {
        let store = Arc::new(RecordingStore::default());
        let mut persister = SettingsPersister::new(store.clone(), SAVE_DEBOUNCE);
        let start = Instant::now();
        let mut settings = MeshSettings::default();

        persister.mark_changed(start);
        assert!(persister.poll(start + Duration::from_millis(1_500), &settings).is_none());

        persister.mark_changed(start + Duration::from_millis(1_500));
        settings.node_override_mut("h1").repulsion = Some(250.0);
        assert!(persister.poll(start + Duration::from_millis(3_000), &settings).is_none());
        assert_eq!(
            persister.time_until_due(start + Duration::from_millis(3_000)),
            Some(Duration::from_millis(500))
        );

        let handle = persister
            .poll(start + Duration::from_millis(3_500), &settings)
            .expect("save dispatched");
        handle.join().expect("save thread");

        let saved = store.saved.lock().expect("saved lock");
        assert_eq!(saved.len(), 1);
        assert_eq!(MeshSettings::from_blob(&saved[0]).expect("parse"), settings);
        assert!(!persister.is_pending());
    }

    #[test]
    fn flush_writes_only_when_pending() {
        let store = Arc::new(RecordingStore::default());
        let mut persister = SettingsPersister::new(store.clone(), SAVE_DEBOUNCE);
        let settings = MeshSettings::default();

        persister.flush(&settings);
        assert!(store.saved.lock().expect("saved lock").is_empty());

        persister.mark_changed(Instant::now());
        persister.flush(&settings);
        assert_eq!(store.saved.lock().expect("saved lock").len(), 1);
    }

    #[test]
    fn failed_save_is_not_fatal() {
        let mut persister = SettingsPersister::new(Arc::new(BrokenStore), Duration::ZERO);
        persister.mark_changed(Instant::now());
        persister.flush(&MeshSettings::default());
        assert!(!persister.is_pending());
    }
}
