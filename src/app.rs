use crate::{
    config::{self, AppSettings, GameInfo},
    download::{self, Downloader, HttpDownloader},
    file_ops::{self, StructureOutcome, SCREENSHOTS_DIR},
    scanner,
    skin::{DisplaySkin, LocalSkin, Skin, SkinTypeInfo, Slot, Source, WebSkin},
    source::{self, AddressBook, CatalogSource, SkinSource},
    state::{backup_location_for, SkinsState},
    store,
    worker::{FileOp, FileOpOutput, FileOpWorker},
};
use anyhow::{anyhow, bail, Context, Result};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::{Command, Stdio},
    sync::Arc,
};

const LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Top-level workflows; only one runs at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Workflow {
    Apply,
    Refresh,
    Restore,
    StartGame,
    Structure,
}

impl Workflow {
    pub fn label(self) -> &'static str {
        match self {
            Workflow::Apply => "apply",
            Workflow::Refresh => "refresh",
            Workflow::Restore => "restore",
            Workflow::StartGame => "start game",
            Workflow::Structure => "create structure",
        }
    }
}

/// Decisions a workflow hands back to the user.
pub trait Prompt {
    fn confirm(&mut self, question: &str) -> bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { skin: LocalSkin, files: usize },
    ApplyFailed { error: String },
    AbortedBeforeMaterialization { error: String },
    AbortedNoBackup,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutcome {
    Restored { slot: Slot, files: usize },
    NothingApplied { slot: Slot },
    Failed { error: String },
}

#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    pub local_skins: usize,
    pub local_error: Option<String>,
    pub sources: Vec<(Source, usize)>,
    pub failed_sources: Vec<(Source, String)>,
}

pub struct App {
    pub settings: AppSettings,
    pub game: GameInfo,
    pub state: SkinsState,
    pub logs: Vec<LogEntry>,
    busy: Option<Workflow>,
    worker: FileOpWorker,
    source: Arc<dyn SkinSource>,
    downloader: Box<dyn Downloader>,
    log_path: PathBuf,
}

impl App {
    pub fn initialize() -> Result<Self> {
        let settings = AppSettings::load_or_create()?;
        Self::with_services(settings, Arc::new(CatalogSource), Box::new(HttpDownloader))
    }

    pub fn with_services(
        settings: AppSettings,
        source: Arc<dyn SkinSource>,
        downloader: Box<dyn Downloader>,
    ) -> Result<Self> {
        let game = GameInfo::load_or_create(&settings.game_info_path(), &settings.data_dir)?;
        let log_path = settings.log_path();
        let mut app = Self {
            settings,
            game,
            state: SkinsState::default(),
            logs: Vec::new(),
            busy: None,
            worker: FileOpWorker::spawn(),
            source,
            downloader,
            log_path,
        };
        app.reload_state();
        Ok(app)
    }

    /// Rebuilds state from the skins folder, the web cache and the applied list.
    pub fn reload_state(&mut self) {
        let books = match config::load_address_books(&self.settings.address_books_path()) {
            Ok(books) => books,
            Err(err) => {
                self.log_warn(format!("Address books unavailable: {err:#}"));
                Vec::new()
            }
        };
        let mut state = SkinsState::new(books);

        match scanner::scan_local_skins(&self.game.skins_location) {
            Ok(skins) => state = state.add_local_skins(skins),
            Err(err) => self.log_warn(format!("Local scan failed: {err:#}")),
        }
        match store::load_web_skins(&self.settings.cached_skins_path()) {
            Ok(skins) => state = state.add_web_skins(skins),
            Err(err) => self.log_warn(format!("Web cache unreadable: {err:#}")),
        }
        match store::load_applied_skins(&self.settings.applied_skins_path()) {
            Ok(skins) => state = state.add_applied_skins(skins),
            Err(err) => self.log_warn(format!("Applied skins unreadable: {err:#}")),
        }

        self.state = state.without_materialized_web_skins();
    }

    /// Writes the web cache and the applied slots back to disk.
    pub fn persist(&self) -> Result<()> {
        store::save_web_skins(&self.settings.cached_skins_path(), self.state.web_skins())?;
        self.save_applied()?;
        self.settings.save()?;
        Ok(())
    }

    /// Updates the game/skins locations; the skins folder change takes effect on the next scan.
    pub fn configure_game(
        &mut self,
        game_location: Option<PathBuf>,
        game_executable: Option<String>,
        skins_location: Option<PathBuf>,
    ) -> Result<()> {
        if let Some(location) = game_location {
            if !location.is_dir() {
                bail!("Game folder not found: {}", location.display());
            }
            self.game.game_location = location;
        }
        if let Some(executable) = game_executable {
            self.game.game_executable = executable;
        }
        if let Some(location) = skins_location {
            self.game.skins_location = location;
        }
        self.game.save(&self.settings.game_info_path())?;
        self.log_info(format!(
            "Game info saved to {}",
            self.settings.game_info_path().display()
        ));
        Ok(())
    }

    pub fn skins_root(&self) -> &Path {
        &self.game.skins_location
    }

    pub fn apply_skin(
        &mut self,
        selection: Option<&DisplaySkin>,
        prompt: &mut dyn Prompt,
    ) -> Result<ApplyOutcome> {
        let Some(display) = selection else {
            bail!("No skin selected");
        };
        self.begin(Workflow::Apply)?;
        let outcome = self.run_apply(display, prompt);
        self.busy = None;
        outcome
    }

    pub fn restore_skin(&mut self, slot: &Slot) -> Result<RestoreOutcome> {
        self.begin(Workflow::Restore)?;
        let outcome = self.run_restore(slot);
        self.busy = None;
        outcome
    }

    /// Re-scans local skins and, when `include_web` is set, re-reads the given
    /// source (or every source). Each source replaces only its own entries.
    pub fn refresh_skins(&mut self, include_web: bool, only: Option<&Source>) -> Result<RefreshReport> {
        self.begin(Workflow::Refresh)?;
        let report = self.run_refresh(include_web, only);
        self.busy = None;
        report
    }

    /// Replaces the local collection with what is on disk now; vanished folders drop out.
    pub fn rescan_local_skins(&mut self) -> Result<usize> {
        self.begin(Workflow::Refresh)?;
        let scanned = scanner::scan_local_skins(&self.game.skins_location);
        self.busy = None;
        let skins = match scanned {
            Ok(skins) => skins,
            Err(err) => {
                self.log_error(format!("Local scan failed: {err:#}"));
                return Err(err);
            }
        };
        let count = skins.len();
        self.state = self
            .state
            .replace_local_skins(skins)
            .without_materialized_web_skins();
        self.log_info(format!("Found {count} local skin(s)"));
        Ok(count)
    }

    pub fn start_game(&mut self) -> Result<()> {
        self.begin(Workflow::StartGame)?;
        let result = self.run_start_game();
        self.busy = None;
        if let Err(err) = &result {
            self.log_error(format!("Start game failed: {err:#}"));
        }
        result
    }

    pub fn create_structure(&mut self, catalog: Vec<SkinTypeInfo>) -> Result<StructureOutcome> {
        self.begin(Workflow::Structure)?;
        let root = self.game.skins_location.clone();
        let result = self.worker.run(FileOp::CreateStructure {
            catalog,
            skins_root: root.clone(),
        });
        self.busy = None;
        match result {
            Ok(FileOpOutput::Structure(outcome)) => {
                match &outcome {
                    StructureOutcome::Created { folders } => {
                        self.log_info(format!("Created {folders} folder(s) in {}", root.display()))
                    }
                    StructureOutcome::DirectoryNotEmpty => self.log_warn(format!(
                        "{} is not empty; structure not created",
                        root.display()
                    )),
                }
                Ok(outcome)
            }
            Ok(other) => Err(anyhow!("unexpected worker output: {other:?}")),
            Err(err) => {
                self.log_error(format!(
                    "Create structure failed ({}): {err}",
                    err.kind().label()
                ));
                Err(err.into())
            }
        }
    }

    fn begin(&mut self, workflow: Workflow) -> Result<()> {
        if let Some(active) = self.busy {
            bail!(
                "Cannot {}: {} is still running",
                workflow.label(),
                active.label()
            );
        }
        self.busy = Some(workflow);
        Ok(())
    }

    fn run_apply(&mut self, display: &DisplaySkin, prompt: &mut dyn Prompt) -> Result<ApplyOutcome> {
        if !self.game.is_game_configured() {
            bail!("Game location is not configured");
        }
        let id = &display.id;
        let Some(selected) = self.state.skin_from_display(display) else {
            self.log_error(format!("Selected skin {id} is not known"));
            bail!("Unknown skin {id}");
        };

        let skin = match selected {
            Skin::Local(skin) => skin,
            Skin::Web(web) => match self.materialize(&web) {
                Ok(skin) => skin,
                Err(err) => {
                    let error = format!("{err:#}");
                    self.log_error(format!("Download of {} failed: {error}", web.name));
                    return Ok(ApplyOutcome::AbortedBeforeMaterialization { error });
                }
            },
        };

        let root = self.game.skins_location.clone();
        let backup_dir = self
            .state
            .backup_location(&skin.id(), &root)
            .unwrap_or_else(|| backup_location_for(&id.slot(), &root));
        let backup = self.worker.run(FileOp::CreateBackup {
            skin_dir: skin.location.clone(),
            backup_dir: backup_dir.clone(),
            game_dir: self.game.game_location.clone(),
        });
        match backup {
            Ok(FileOpOutput::Copied(report)) => self.log_info(format!(
                "Backed up {} file(s) to {} ({} already saved or new)",
                report.copied,
                backup_dir.display(),
                report.skipped
            )),
            Ok(_) => {}
            Err(err) => {
                self.log_warn(format!(
                    "Backup for {} failed ({}): {err}",
                    skin.name,
                    err.kind().label()
                ));
                let question =
                    format!("Backup failed ({err}). Apply {} without a backup?", skin.name);
                if !prompt.confirm(&question) {
                    self.log_info(format!("Apply of {} cancelled", skin.name));
                    return Ok(ApplyOutcome::AbortedNoBackup);
                }
            }
        }

        let applied = self.worker.run(FileOp::ApplySkin {
            skin_dir: skin.location.clone(),
            game_dir: self.game.game_location.clone(),
        });
        match applied {
            Ok(output) => {
                let files = match output {
                    FileOpOutput::Copied(report) => report.copied,
                    _ => 0,
                };
                self.state = self.state.add_applied_skin(skin.clone());
                if let Err(err) = self.save_applied() {
                    self.log_warn(format!("Could not record applied skin: {err:#}"));
                }
                self.log_info(format!("Applied {} ({files} file(s))", skin.id()));
                Ok(ApplyOutcome::Applied { skin, files })
            }
            Err(err) => {
                let error = err.to_string();
                self.log_error(format!(
                    "Apply of {} failed ({}): {error}",
                    skin.name,
                    err.kind().label()
                ));
                Ok(ApplyOutcome::ApplyFailed { error })
            }
        }
    }

    /// Downloads and unpacks a web skin, then promotes it in state.
    fn materialize(&mut self, web: &WebSkin) -> Result<LocalSkin> {
        let link = web
            .preferred_download_link()
            .ok_or_else(|| anyhow!("{} has no usable download link", web.name))?
            .to_string();
        let mut staging = download::staging_path(&self.settings.downloads_dir(), &link);
        if staging.extension().is_none() {
            staging.set_extension("zip");
        }
        self.log_info(format!("Downloading {} from {link}", web.name));
        self.downloader.download(&link, &staging)?;

        let destination = web.local_location(&self.game.skins_location);
        let extracted = self.worker.run(FileOp::ExtractSkin {
            archive: staging.clone(),
            destination: destination.clone(),
        });
        let _ = fs::remove_file(&staging);
        let files = match extracted.context("extract skin")? {
            FileOpOutput::Extracted(files) => files,
            _ => 0,
        };
        if !file_ops::dir_has_files(&destination) {
            let _ = fs::remove_dir_all(&destination);
            bail!("archive for {} holds no files", web.name);
        }

        self.fetch_screenshots(web, &destination);
        let screenshots = scanner::screenshot_files(&destination);
        self.state = self
            .state
            .change_web_skin_to_local_skin(web, &destination, screenshots);
        self.log_info(format!(
            "Installed {} to {} ({files} file(s))",
            web.name,
            destination.display()
        ));
        self.state
            .find_local_skin_by_id(&web.id())
            .cloned()
            .ok_or_else(|| anyhow!("promoted skin {} missing", web.name))
    }

    fn fetch_screenshots(&mut self, web: &WebSkin, destination: &Path) {
        let dir = destination.join(SCREENSHOTS_DIR);
        for (index, link) in web.screenshot_links.iter().enumerate() {
            let ext = download::url_extension(link).unwrap_or_else(|| "png".to_string());
            let path = dir.join(format!("{:02}.{ext}", index + 1));
            if let Err(err) = self.downloader.download(link, &path) {
                let _ = fs::remove_file(download::partial_path(&path));
                let _ = fs::remove_file(&path);
                self.log_warn(format!("Screenshot {link} skipped: {err:#}"));
            }
        }
    }

    fn run_restore(&mut self, slot: &Slot) -> Result<RestoreOutcome> {
        let Some(applied) = self.state.applied_skin(slot).cloned() else {
            self.log_warn(format!("Nothing applied in {slot}"));
            return Ok(RestoreOutcome::NothingApplied { slot: slot.clone() });
        };
        let root = self.game.skins_location.clone();
        let backup_dir = self
            .state
            .backup_location(&applied.id(), &root)
            .unwrap_or_else(|| backup_location_for(slot, &root));

        let restored = self.worker.run(FileOp::RestoreBackup {
            backup_dir: backup_dir.clone(),
            game_dir: self.game.game_location.clone(),
        });
        match restored {
            Ok(output) => {
                let files = match output {
                    FileOpOutput::Copied(report) => report.copied,
                    _ => 0,
                };
                // The game now holds its originals again; the next apply saves fresh ones.
                if let Err(err) = fs::remove_dir_all(&backup_dir) {
                    self.log_warn(format!(
                        "Could not clear backup {}: {err}",
                        backup_dir.display()
                    ));
                }
                self.state = self.state.remove_applied_skin(slot);
                if let Err(err) = self.save_applied() {
                    self.log_warn(format!("Could not record restore: {err:#}"));
                }
                self.log_info(format!("Restored originals for {slot} ({files} file(s))"));
                Ok(RestoreOutcome::Restored {
                    slot: slot.clone(),
                    files,
                })
            }
            Err(err) => {
                let error = err.to_string();
                self.log_error(format!(
                    "Restore of {slot} failed ({}): {error}",
                    err.kind().label()
                ));
                Ok(RestoreOutcome::Failed { error })
            }
        }
    }

    fn run_refresh(&mut self, include_web: bool, only: Option<&Source>) -> Result<RefreshReport> {
        let mut report = RefreshReport::default();
        match scanner::scan_local_skins(&self.game.skins_location) {
            Ok(skins) => {
                report.local_skins = skins.len();
                self.state = self.state.add_local_skins(skins);
            }
            Err(err) => {
                let error = format!("{err:#}");
                self.log_error(format!("Local scan failed: {error}"));
                report.local_error = Some(error);
            }
        }

        if include_web {
            let books: Vec<AddressBook> = match only {
                Some(wanted) => {
                    let book = self
                        .state
                        .address_book(wanted)
                        .cloned()
                        .ok_or_else(|| anyhow!("Unknown source: {wanted}"))?;
                    vec![book]
                }
                None => self.state.address_books().to_vec(),
            };
            let fetched = source::fetch_sources(Arc::clone(&self.source), &books);
            let full = only.is_none() && fetched.iter().all(|(_, result)| result.is_ok());
            let mut state = if full {
                // Every source answered: entries of sources no longer listed go too.
                self.state.replace_web_skins(Vec::new())
            } else {
                self.state.clone()
            };
            for (source, result) in fetched {
                match result {
                    Ok(fetch) => {
                        for warning in &fetch.warnings {
                            self.log_warn(warning.clone());
                        }
                        self.log_info(format!("{source}: {} skin(s)", fetch.skins.len()));
                        report.sources.push((source.clone(), fetch.skins.len()));
                        state = state.replace_web_skins_from(&source, fetch.skins);
                    }
                    Err(err) => {
                        let error = format!("{err:#}");
                        self.log_warn(format!("{source}: no new data ({error})"));
                        report.failed_sources.push((source, error));
                    }
                }
            }
            self.state = state;
        }

        self.state = self.state.without_materialized_web_skins();
        Ok(report)
    }

    fn run_start_game(&mut self) -> Result<()> {
        let exe = self
            .game
            .executable_path()
            .context("Game executable is not configured")?;
        if !exe.is_file() {
            bail!("Game executable not found: {}", exe.display());
        }
        Command::new(&exe)
            .current_dir(&self.game.game_location)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launch {}", exe.display()))?;
        self.log_info(format!("Started {}", exe.display()));
        Ok(())
    }

    fn save_applied(&self) -> Result<()> {
        store::save_applied_skins(
            &self.settings.applied_skins_path(),
            self.state.applied_skins(),
        )
    }

    pub fn log_info(&mut self, message: String) {
        self.push_log(LogLevel::Info, message);
    }

    pub fn log_warn(&mut self, message: String) {
        self.push_log(LogLevel::Warn, message);
    }

    pub fn log_error(&mut self, message: String) {
        self.push_log(LogLevel::Error, message);
    }

    fn push_log(&mut self, level: LogLevel, message: String) {
        let _ = append_log_file(&self.log_path, level, &message);
        self.logs.push(LogEntry { level, message });
        if self.logs.len() > LOG_CAPACITY {
            let overflow = self.logs.len() - LOG_CAPACITY;
            self.logs.drain(0..overflow);
        }
    }
}

pub fn log_level_label(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Info => "INFO",
        LogLevel::Warn => "WARN",
        LogLevel::Error => "ERROR",
    }
}

fn append_log_file(path: &Path, level: LogLevel, message: &str) -> std::io::Result<()> {
    let label = log_level_label(level);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "[{label}] {message}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skin::SkinId;
    use crate::source::tests::{book, web_skin, FakeSource};
    use std::collections::HashMap;
    use tempfile::TempDir;

    struct Answer {
        value: bool,
        asked: usize,
    }

    impl Prompt for Answer {
        fn confirm(&mut self, _question: &str) -> bool {
            self.asked += 1;
            self.value
        }
    }

    fn answer(value: bool) -> Answer {
        Answer { value, asked: 0 }
    }

    /// Serves zip archives built from `(path, contents)` pairs.
    #[derive(Default)]
    struct FakeDownloader {
        archives: HashMap<String, Vec<(String, String)>>,
    }

    impl Downloader for FakeDownloader {
        fn download(&self, url: &str, dest: &Path) -> Result<()> {
            let files = self
                .archives
                .get(url)
                .ok_or_else(|| anyhow!("404 {url}"))?;
            fs::create_dir_all(dest.parent().unwrap())?;
            let mut writer = zip::ZipWriter::new(fs::File::create(dest)?);
            for (name, contents) in files {
                writer.start_file(name.as_str(), zip::write::SimpleFileOptions::default())?;
                writer.write_all(contents.as_bytes())?;
            }
            writer.finish()?;
            Ok(())
        }
    }

    /// Writes a partial screenshot, then fails like a dropped connection.
    struct DroppedConnection;

    impl Downloader for DroppedConnection {
        fn download(&self, url: &str, dest: &Path) -> Result<()> {
            if download::url_extension(url).as_deref() == Some("zip") {
                return FakeDownloader::serving(url, &[("data/map_forest.xvm", "rappy")])
                    .download(url, dest);
            }
            write(&download::partial_path(dest), "half");
            bail!("connection reset while fetching {url}")
        }
    }

    impl FakeDownloader {
        fn serving(url: &str, files: &[(&str, &str)]) -> Self {
            let mut downloader = Self::default();
            downloader.archives.insert(
                url.to_string(),
                files
                    .iter()
                    .map(|(name, contents)| (name.to_string(), contents.to_string()))
                    .collect(),
            );
            downloader
        }
    }

    fn pick(app: &App, id: &SkinId) -> DisplaySkin {
        app.state.find_skin(id).expect("known skin").display()
    }

    fn has_web(app: &App, name: &str) -> bool {
        app.state.web_skins().iter().any(|skin| skin.name == name)
    }

    fn has_local(app: &App, name: &str) -> bool {
        app.state.local_skins().iter().any(|skin| skin.name == name)
    }

    fn write(path: &Path, contents: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn read(path: &Path) -> String {
        fs::read_to_string(path).unwrap()
    }

    struct Fixture {
        tmp: TempDir,
        app: App,
    }

    impl Fixture {
        fn game(&self) -> PathBuf {
            self.tmp.path().join("game")
        }

        fn skins(&self) -> PathBuf {
            self.tmp.path().join("data/skins")
        }
    }

    fn fixture(
        source: FakeSource,
        downloader: impl Downloader + 'static,
        books: &[AddressBook],
    ) -> Fixture {
        let tmp = TempDir::new().unwrap();
        let data = tmp.path().join("data");
        let settings = AppSettings::load_or_create_in(&data).unwrap();
        store::save_list(&settings.address_books_path(), books).unwrap();
        let game = tmp.path().join("game");
        write(&game.join("data/map_forest.xvm"), "original");
        let info = GameInfo {
            skins_location: data.join("skins"),
            game_location: game,
            game_executable: String::new(),
        };
        info.save(&settings.game_info_path()).unwrap();
        fs::create_dir_all(data.join("skins")).unwrap();

        let app = App::with_services(settings, Arc::new(source), Box::new(downloader)).unwrap();
        Fixture { tmp, app }
    }

    #[test]
    fn local_skin_is_backed_up_applied_and_recorded() {
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[]);
        write(
            &fx.skins().join("Area/Forest/Moss_by_Alice/data/map_forest.xvm"),
            "moss",
        );
        fx.app.reload_state();

        let id = SkinId::new("Moss_by_Alice", "Area", "Forest");
        let mut prompt = answer(false);
        let selected = pick(&fx.app, &id);
        let outcome = fx.app.apply_skin(Some(&selected), &mut prompt).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { files: 1, .. }));
        assert_eq!(prompt.asked, 0);
        assert_eq!(read(&fx.game().join("data/map_forest.xvm")), "moss");
        assert_eq!(
            read(&fx.skins().join("Area/Originals/Forest/data/map_forest.xvm")),
            "original"
        );
        let slot = Slot::new("Area", "Forest");
        assert_eq!(fx.app.state.applied_skin(&slot).unwrap().name, "Moss_by_Alice");

        let saved = store::load_applied_skins(&fx.app.settings.applied_skins_path()).unwrap();
        assert_eq!(saved.len(), 1);
        assert!(fx.app.busy.is_none());
    }

    #[test]
    fn web_skin_is_downloaded_promoted_and_applied() {
        let site = book("one");
        let mut rappy = web_skin(&site, "Al Rappy", "Area", "Forest");
        rappy.screenshot_links = vec!["https://one.test/shots/missing.png".to_string()];
        let mut downloader = FakeDownloader::default();
        downloader.archives.insert(
            rappy.download_links[0].clone(),
            vec![("data/map_forest.xvm".to_string(), "rappy".to_string())],
        );
        let mut fx = fixture(FakeSource::default(), downloader, &[site]);
        fx.app.state = fx.app.state.add_web_skins(vec![rappy.clone()]);

        let selected = pick(&fx.app, &rappy.id());
        let outcome = fx.app.apply_skin(Some(&selected), &mut answer(false)).unwrap();
        let ApplyOutcome::Applied { skin, .. } = outcome else {
            panic!("expected apply, got {outcome:?}");
        };
        assert_eq!(skin.location, fx.skins().join("Area/Forest/Al Rappy_by_Bob"));
        assert!(!has_web(&fx.app, "Al Rappy"));
        assert!(has_local(&fx.app, "Al Rappy"));
        assert_eq!(read(&fx.game().join("data/map_forest.xvm")), "rappy");
        assert!(fx
            .app
            .logs
            .iter()
            .any(|entry| entry.level == LogLevel::Warn && entry.message.contains("Screenshot")));
        let leftovers = fs::read_dir(fx.app.settings.downloads_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn failed_download_leaves_the_game_alone() {
        let site = book("one");
        let rappy = web_skin(&site, "Al Rappy", "Area", "Forest");
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[site]);
        fx.app.state = fx.app.state.add_web_skins(vec![rappy.clone()]);

        let selected = pick(&fx.app, &rappy.id());
        let outcome = fx.app.apply_skin(Some(&selected), &mut answer(true)).unwrap();
        assert!(matches!(
            outcome,
            ApplyOutcome::AbortedBeforeMaterialization { .. }
        ));
        assert_eq!(read(&fx.game().join("data/map_forest.xvm")), "original");
        assert!(has_web(&fx.app, "Al Rappy"));
        assert!(!fx.skins().join("Area/Originals").exists());
    }

    #[test]
    fn failed_backup_needs_confirmation() {
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[]);
        write(
            &fx.skins().join("Area/Forest/Moss/data/map_forest.xvm"),
            "moss",
        );
        write(&fx.skins().join("Area/Originals"), "blocks the backup dir");
        fx.app.reload_state();
        let id = SkinId::new("Moss", "Area", "Forest");
        let selected = pick(&fx.app, &id);

        let mut declined = answer(false);
        let outcome = fx.app.apply_skin(Some(&selected), &mut declined).unwrap();
        assert_eq!(outcome, ApplyOutcome::AbortedNoBackup);
        assert_eq!(declined.asked, 1);
        assert_eq!(read(&fx.game().join("data/map_forest.xvm")), "original");
        assert!(fx.app.state.applied_skin(&id.slot()).is_none());

        let mut accepted = answer(true);
        let outcome = fx.app.apply_skin(Some(&selected), &mut accepted).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { .. }));
        assert_eq!(read(&fx.game().join("data/map_forest.xvm")), "moss");
    }

    #[test]
    fn restore_brings_back_originals_and_frees_the_slot() {
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[]);
        write(
            &fx.skins().join("Area/Forest/Moss/data/map_forest.xvm"),
            "moss",
        );
        fx.app.reload_state();
        let id = SkinId::new("Moss", "Area", "Forest");
        let selected = pick(&fx.app, &id);
        fx.app.apply_skin(Some(&selected), &mut answer(false)).unwrap();

        let slot = id.slot();
        let outcome = fx.app.restore_skin(&slot).unwrap();
        assert_eq!(
            outcome,
            RestoreOutcome::Restored {
                slot: slot.clone(),
                files: 1
            }
        );
        assert_eq!(read(&fx.game().join("data/map_forest.xvm")), "original");
        assert!(fx.app.state.applied_skin(&slot).is_none());
        assert!(!backup_location_for(&slot, &fx.skins()).exists());

        let again = fx.app.restore_skin(&slot).unwrap();
        assert_eq!(again, RestoreOutcome::NothingApplied { slot });
    }

    #[test]
    fn later_backups_follow_the_patched_game() {
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[]);
        let game_file = fx.game().join("data/map_forest.xvm");
        write(&game_file, "v1-original");
        write(
            &fx.skins().join("Area/Forest/Moss/data/map_forest.xvm"),
            "moss",
        );
        fx.app.reload_state();
        let id = SkinId::new("Moss", "Area", "Forest");
        let selected = pick(&fx.app, &id);

        fx.app.apply_skin(Some(&selected), &mut answer(false)).unwrap();
        fx.app.restore_skin(&id.slot()).unwrap();
        assert_eq!(read(&game_file), "v1-original");

        write(&game_file, "v2-patched");
        fx.app.apply_skin(Some(&selected), &mut answer(false)).unwrap();
        assert_eq!(read(&game_file), "moss");
        fx.app.restore_skin(&id.slot()).unwrap();
        assert_eq!(read(&game_file), "v2-patched");
    }

    #[test]
    fn broken_screenshot_download_leaves_nothing_behind() {
        let site = book("one");
        let mut rappy = web_skin(&site, "Al Rappy", "Area", "Forest");
        rappy.screenshot_links = vec!["https://one.test/shots/1.png".to_string()];
        let mut fx = fixture(FakeSource::default(), DroppedConnection, &[site]);
        fx.app.state = fx.app.state.add_web_skins(vec![rappy.clone()]);

        let selected = pick(&fx.app, &rappy.id());
        let outcome = fx.app.apply_skin(Some(&selected), &mut answer(false)).unwrap();
        let ApplyOutcome::Applied { skin, .. } = outcome else {
            panic!("expected apply, got {outcome:?}");
        };
        assert!(skin.screenshot_file_names.is_empty());
        let shots = skin.location.join(SCREENSHOTS_DIR);
        let leftovers = fs::read_dir(&shots).map(|dir| dir.count()).unwrap_or(0);
        assert_eq!(leftovers, 0);

        fx.app.rescan_local_skins().unwrap();
        let rescanned = fx
            .app
            .state
            .local_skins()
            .iter()
            .find(|local| local.location == skin.location)
            .unwrap();
        assert!(rescanned.screenshot_file_names.is_empty());
    }

    #[test]
    fn empty_archive_aborts_before_promotion() {
        let site = book("one");
        let rappy = web_skin(&site, "Al Rappy", "Area", "Forest");
        let downloader = FakeDownloader::serving(&rappy.download_links[0], &[]);
        let mut fx = fixture(FakeSource::default(), downloader, &[site]);
        fx.app.state = fx.app.state.add_web_skins(vec![rappy.clone()]);

        let selected = pick(&fx.app, &rappy.id());
        let outcome = fx.app.apply_skin(Some(&selected), &mut answer(true)).unwrap();
        let ApplyOutcome::AbortedBeforeMaterialization { error } = outcome else {
            panic!("expected abort, got {outcome:?}");
        };
        assert!(error.contains("holds no files"));
        assert!(!rappy.local_location(&fx.skins()).exists());
        assert!(has_web(&fx.app, "Al Rappy"));
        assert_eq!(read(&fx.game().join("data/map_forest.xvm")), "original");
    }

    #[test]
    fn link_without_extension_is_unpacked_as_zip() {
        let site = book("one");
        let mut rappy = web_skin(&site, "Al Rappy", "Area", "Forest");
        rappy.download_links = vec!["https://one.test/download/42".to_string()];
        let downloader = FakeDownloader::serving(
            &rappy.download_links[0],
            &[("data/map_forest.xvm", "rappy")],
        );
        let mut fx = fixture(FakeSource::default(), downloader, &[site]);
        fx.app.state = fx.app.state.add_web_skins(vec![rappy.clone()]);

        let selected = pick(&fx.app, &rappy.id());
        let outcome = fx.app.apply_skin(Some(&selected), &mut answer(false)).unwrap();
        assert!(matches!(outcome, ApplyOutcome::Applied { files: 1, .. }));
        assert_eq!(read(&fx.game().join("data/map_forest.xvm")), "rappy");
    }

    #[test]
    fn full_refresh_drops_unlisted_sources() {
        let one = book("one");
        let gone = book("gone");
        let site = FakeSource::default().with_skin(&one, web_skin(&one, "Fresh", "Area", "Forest"));
        let mut fx = fixture(site, FakeDownloader::default(), &[one.clone()]);
        fx.app.state = fx.app.state.add_web_skins(vec![
            web_skin(&one, "Stale", "Area", "Forest"),
            web_skin(&gone, "Orphan", "Area", "Caves"),
        ]);

        let report = fx.app.refresh_skins(true, None).unwrap();
        assert!(report.failed_sources.is_empty());
        let names: Vec<&str> = fx
            .app
            .state
            .web_skins()
            .iter()
            .map(|skin| skin.name.as_str())
            .collect();
        assert_eq!(names, vec!["Fresh"]);
    }

    #[test]
    fn refresh_replaces_only_the_chosen_source() {
        let one = book("one");
        let two = book("two");
        let site = FakeSource::default()
            .with_skin(&one, web_skin(&one, "Fresh", "Area", "Forest"))
            .with_skin(&two, web_skin(&two, "Other Fresh", "Area", "Caves"));
        let mut fx = fixture(site, FakeDownloader::default(), &[one.clone(), two.clone()]);
        fx.app.state = fx.app.state.add_web_skins(vec![
            web_skin(&one, "Stale", "Area", "Forest"),
            web_skin(&two, "Kept", "Area", "Caves"),
        ]);
        write(&fx.skins().join("Area/Forest/Moss/a.dat"), "a");

        let report = fx.app.refresh_skins(true, Some(&one.source)).unwrap();
        assert_eq!(report.local_skins, 1);
        assert_eq!(report.sources, vec![(one.source.clone(), 1)]);

        let names: Vec<&str> = fx
            .app
            .state
            .web_skins()
            .iter()
            .map(|skin| skin.name.as_str())
            .collect();
        assert_eq!(names, vec!["Kept", "Fresh"]);
        assert!(has_local(&fx.app, "Moss"));
    }

    #[test]
    fn unreachable_source_keeps_its_cached_entries() {
        let one = book("one");
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[one.clone()]);
        fx.app.state = fx
            .app
            .state
            .add_web_skins(vec![web_skin(&one, "Cached", "Area", "Forest")]);

        let report = fx.app.refresh_skins(true, None).unwrap();
        assert_eq!(report.failed_sources.len(), 1);
        assert_eq!(fx.app.state.web_skins().len(), 1);

        let local_only = fx.app.refresh_skins(false, None).unwrap();
        assert!(local_only.sources.is_empty());
    }

    #[test]
    fn rescan_forgets_deleted_folders() {
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[]);
        write(&fx.skins().join("Area/Forest/Moss/a.dat"), "a");
        write(&fx.skins().join("Area/Forest/Fern/a.dat"), "a");
        assert_eq!(fx.app.rescan_local_skins().unwrap(), 2);

        fs::remove_dir_all(fx.skins().join("Area/Forest/Fern")).unwrap();
        assert_eq!(fx.app.rescan_local_skins().unwrap(), 1);
        assert!(!has_local(&fx.app, "Fern"));
        assert!(has_local(&fx.app, "Moss"));
    }

    #[test]
    fn configure_game_rejects_missing_folders() {
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[]);
        let missing = fx.tmp.path().join("nowhere");
        assert!(fx.app.configure_game(Some(missing), None, None).is_err());

        fx.app
            .configure_game(None, Some("game.exe".to_string()), None)
            .unwrap();
        let saved =
            GameInfo::load_or_create(&fx.app.settings.game_info_path(), &fx.app.settings.data_dir)
                .unwrap();
        assert_eq!(saved.game_executable, "game.exe");
        assert_eq!(saved.game_location, fx.game());
    }

    #[test]
    fn workflows_do_not_overlap() {
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[]);
        fx.app.busy = Some(Workflow::Refresh);
        let err = fx
            .app
            .restore_skin(&Slot::new("Area", "Forest"))
            .unwrap_err();
        assert!(err.to_string().contains("refresh"));

        fx.app.busy = None;
        assert!(fx.app.apply_skin(None, &mut answer(true)).is_err());
    }

    #[test]
    fn state_round_trips_through_persist() {
        let one = book("one");
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[one.clone()]);
        write(&fx.skins().join("Area/Forest/Moss/data/map_forest.xvm"), "moss");
        fx.app.reload_state();
        fx.app.state = fx
            .app
            .state
            .add_web_skins(vec![web_skin(&one, "Leaf", "Area", "Forest")]);
        let selected = pick(&fx.app, &SkinId::new("Moss", "Area", "Forest"));
        fx.app.apply_skin(Some(&selected), &mut answer(false)).unwrap();
        fx.app.persist().unwrap();

        let settings = AppSettings::load_or_create_in(&fx.tmp.path().join("data")).unwrap();
        let reopened = App::with_services(
            settings,
            Arc::new(FakeSource::default()),
            Box::new(FakeDownloader::default()),
        )
        .unwrap();
        assert!(has_web(&reopened, "Leaf"));
        assert_eq!(
            reopened
                .state
                .applied_skin(&Slot::new("Area", "Forest"))
                .map(|skin| skin.name.as_str()),
            Some("Moss")
        );
        assert_eq!(reopened.state.address_books(), &[one]);
    }

    #[test]
    fn structure_is_only_built_into_an_empty_root() {
        let mut fx = fixture(FakeSource::default(), FakeDownloader::default(), &[]);
        let catalog = vec![SkinTypeInfo {
            name: "Area".to_string(),
            subtypes: vec!["Forest".to_string()],
        }];
        let outcome = fx.app.create_structure(catalog.clone()).unwrap();
        assert_eq!(outcome, StructureOutcome::Created { folders: 1 });
        let again = fx.app.create_structure(catalog).unwrap();
        assert_eq!(again, StructureOutcome::DirectoryNotEmpty);
    }
}
