use crate::{
    app::{log_level_label, ApplyOutcome, App, LogLevel, Prompt, RefreshReport, RestoreOutcome},
    config,
    file_ops::StructureOutcome,
    skin::{DisplaySkin, Skin, SkinId, Slot, Source},
};
use anyhow::{anyhow, bail, Result};
use serde::Serialize;
use std::{
    io::{self, BufRead, Write},
    path::PathBuf,
};

#[derive(Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

struct GlobalOptions {
    format: OutputFormat,
    verbose: bool,
}

enum CliCommand {
    List(ListOptions),
    Search(String),
    Applied,
    Scan,
    Refresh(RefreshOptions),
    Apply { id: SkinId, assume_yes: bool },
    Restore(Slot),
    Structure { catalog: Option<PathBuf> },
    Configure(ConfigureOptions),
    Start,
    Paths,
    Help,
    Version,
}

#[derive(Default)]
struct ListOptions {
    skin_type: Option<String>,
    sub_type: Option<String>,
    local_only: bool,
}

#[derive(Default)]
struct ConfigureOptions {
    game: Option<PathBuf>,
    executable: Option<String>,
    skins: Option<PathBuf>,
}

#[derive(Default)]
struct RefreshOptions {
    web: Option<bool>,
    source: Option<Source>,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, tokens) = parse_global_options(&args)?;
    let command = parse_command(&tokens)?;
    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("SkinSmith v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        command => {
            let mut app = App::initialize()?;
            let mark = app.logs.len();
            let result = run_command(&mut app, command, global.format);
            if let Err(err) = app.persist() {
                app.log_error(format!("Saving state failed: {err:#}"));
            }
            print_logs(&app, mark, global.verbose);
            result
        }
    }
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut format = OutputFormat::Text;
    let mut verbose = false;
    let mut tokens = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if let Some(value) = arg.strip_prefix("--format=") {
            format = OutputFormat::parse(value)
                .ok_or_else(|| anyhow!("Unknown format: {value}"))?;
            continue;
        }
        if arg == "--format" {
            let value = iter
                .next()
                .ok_or_else(|| anyhow!("--format requires a value"))?;
            format = OutputFormat::parse(value)
                .ok_or_else(|| anyhow!("Unknown format: {value}"))?;
            continue;
        }
        if arg == "-v" || arg == "--verbose" {
            verbose = true;
            continue;
        }
        tokens.push(arg.to_string());
    }
    Ok((GlobalOptions { format, verbose }, tokens))
}

fn parse_command(tokens: &[String]) -> Result<CliCommand> {
    let Some(head) = tokens.first() else {
        return Ok(CliCommand::Help);
    };
    let rest = tokens.get(1..).unwrap_or(&[]);
    let command = match head.as_str() {
        "list" => CliCommand::List(parse_list(rest)?),
        "search" => {
            if rest.is_empty() {
                bail!("search requires some text");
            }
            CliCommand::Search(rest.join(" "))
        }
        "applied" => CliCommand::Applied,
        "scan" => CliCommand::Scan,
        "refresh" => CliCommand::Refresh(parse_refresh(rest)?),
        "apply" => {
            let assume_yes = rest.iter().any(|arg| arg == "--yes" || arg == "-y");
            let positional: Vec<&String> =
                rest.iter().filter(|arg| !arg.starts_with('-')).collect();
            let [skin_type, sub_type, name] = positional.as_slice() else {
                bail!("apply requires <type> <subtype> <name>");
            };
            CliCommand::Apply {
                id: SkinId::new(name, skin_type, sub_type),
                assume_yes,
            }
        }
        "restore" => {
            let [skin_type, sub_type] = rest else {
                bail!("restore requires <type> <subtype>");
            };
            CliCommand::Restore(Slot::new(skin_type, sub_type))
        }
        "structure" => {
            let mut catalog = None;
            let mut iter = rest.iter();
            while let Some(arg) = iter.next() {
                match arg.as_str() {
                    "--catalog" => {
                        let value = iter
                            .next()
                            .ok_or_else(|| anyhow!("--catalog requires a path"))?;
                        catalog = Some(PathBuf::from(value));
                    }
                    value if value.starts_with("--catalog=") => {
                        catalog = Some(PathBuf::from(value.trim_start_matches("--catalog=")));
                    }
                    other => bail!("Unknown structure option: {other}"),
                }
            }
            CliCommand::Structure { catalog }
        }
        "configure" => CliCommand::Configure(parse_configure(rest)?),
        "start" => CliCommand::Start,
        "paths" => CliCommand::Paths,
        "help" | "--help" | "-h" => CliCommand::Help,
        "version" | "--version" | "-V" => CliCommand::Version,
        other => bail!("Unknown command: {other} (see 'skinsmith help')"),
    };
    Ok(command)
}

fn parse_list(args: &[String]) -> Result<ListOptions> {
    let mut options = ListOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--type" => {
                let value = iter.next().ok_or_else(|| anyhow!("--type requires a value"))?;
                options.skin_type = Some(value.to_string());
            }
            "--subtype" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--subtype requires a value"))?;
                options.sub_type = Some(value.to_string());
            }
            "--local-only" => options.local_only = true,
            other => bail!("Unknown list option: {other}"),
        }
    }
    Ok(options)
}

fn parse_configure(args: &[String]) -> Result<ConfigureOptions> {
    let mut options = ConfigureOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        let flag = arg.as_str();
        let value = iter
            .next()
            .ok_or_else(|| anyhow!("{flag} requires a value"))?;
        match flag {
            "--game" => options.game = Some(PathBuf::from(value)),
            "--exe" => options.executable = Some(value.to_string()),
            "--skins" => options.skins = Some(PathBuf::from(value)),
            other => bail!("Unknown configure option: {other}"),
        }
    }
    if options.game.is_none() && options.executable.is_none() && options.skins.is_none() {
        bail!("configure needs --game, --exe or --skins");
    }
    Ok(options)
}

fn parse_refresh(args: &[String]) -> Result<RefreshOptions> {
    let mut options = RefreshOptions::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--web" => options.web = Some(true),
            "--local" => options.web = Some(false),
            "--source" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--source requires a name"))?;
                options.source = Some(Source::new(value));
            }
            value if value.starts_with("--source=") => {
                options.source = Some(Source::new(value.trim_start_matches("--source=")));
            }
            other => bail!("Unknown refresh option: {other}"),
        }
    }
    Ok(options)
}

fn run_command(app: &mut App, command: CliCommand, format: OutputFormat) -> Result<()> {
    match command {
        CliCommand::List(options) => list_skins(app, options, format),
        CliCommand::Search(text) => {
            let skins: Vec<DisplaySkin> = app.state.search_skins(&text).map(|s| s.display()).collect();
            print_skins(&skins, format)
        }
        CliCommand::Applied => list_applied(app, format),
        CliCommand::Scan => {
            let count = app.rescan_local_skins()?;
            let report = RefreshReport {
                local_skins: count,
                ..RefreshReport::default()
            };
            print_refresh(&report, format)
        }
        CliCommand::Refresh(options) => {
            let include_web = options.web.unwrap_or(app.settings.include_web);
            let source = options.source.or_else(|| app.settings.selected_source.clone());
            let report = app.refresh_skins(include_web, source.as_ref())?;
            print_refresh(&report, format)
        }
        CliCommand::Apply { id, assume_yes } => {
            let mut prompt = StdinPrompt { assume_yes };
            let selection = app
                .state
                .available_skins(&id.skin_type, &id.sub_type, app.settings.include_web)
                .into_iter()
                .find(|skin| skin.name() == id.name)
                .map(|skin| skin.display());
            if selection.is_none() {
                bail!("No skin {id} among the available skins; try `skinsmith list`");
            }
            let outcome = app.apply_skin(selection.as_ref(), &mut prompt)?;
            print_apply(&outcome, format)
        }
        CliCommand::Restore(slot) => {
            let outcome = app.restore_skin(&slot)?;
            print_restore(&outcome, format)
        }
        CliCommand::Structure { catalog } => {
            let path = catalog.unwrap_or_else(|| app.settings.skin_types_path());
            let types = config::load_skin_types(&path)?;
            if types.is_empty() {
                bail!("No skin types found in {}", path.display());
            }
            let outcome = app.create_structure(types)?;
            match (format, outcome) {
                (OutputFormat::Json, outcome) => {
                    let output = match outcome {
                        StructureOutcome::Created { folders } => StatusOutput {
                            status: "created",
                            detail: Some(format!("{folders} folder(s)")),
                        },
                        StructureOutcome::DirectoryNotEmpty => StatusOutput {
                            status: "directory_not_empty",
                            detail: None,
                        },
                    };
                    println!("{}", serde_json::to_string_pretty(&output)?);
                }
                (OutputFormat::Text, StructureOutcome::Created { folders }) => {
                    println!("Created {folders} folder(s)");
                }
                (OutputFormat::Text, StructureOutcome::DirectoryNotEmpty) => {
                    println!("Skins folder is not empty; nothing created");
                }
            }
            Ok(())
        }
        CliCommand::Configure(options) => {
            app.configure_game(options.game, options.executable, options.skins)?;
            list_paths(app, format)
        }
        CliCommand::Start => {
            app.start_game()?;
            if format == OutputFormat::Json {
                let output = StatusOutput {
                    status: "started",
                    detail: None,
                };
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Game started");
            }
            Ok(())
        }
        CliCommand::Paths => list_paths(app, format),
        CliCommand::Help | CliCommand::Version => Ok(()),
    }
}

/// Reads the answer from stdin unless `--yes` was given.
struct StdinPrompt {
    assume_yes: bool,
}

impl Prompt for StdinPrompt {
    fn confirm(&mut self, question: &str) -> bool {
        if self.assume_yes {
            return true;
        }
        eprint!("{question} [y/N] ");
        let _ = io::stderr().flush();
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return false;
        }
        matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
    }
}

#[derive(Serialize)]
struct StatusOutput {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    detail: Option<String>,
}

fn list_skins(app: &App, options: ListOptions, format: OutputFormat) -> Result<()> {
    let include_web = app.settings.include_web && !options.local_only;
    let skins: Vec<Skin> = match (&options.skin_type, &options.sub_type) {
        (Some(skin_type), Some(sub_type)) => {
            app.state.available_skins(skin_type, sub_type, include_web)
        }
        _ => {
            let candidates: Vec<Skin> = if include_web {
                app.state.all_skins().collect()
            } else {
                app.state.local_skins().iter().cloned().map(Skin::Local).collect()
            };
            candidates
                .into_iter()
                .filter(|skin| {
                    options
                        .skin_type
                        .as_deref()
                        .map_or(true, |wanted| skin.skin_type() == wanted)
                })
                .filter(|skin| {
                    options
                        .sub_type
                        .as_deref()
                        .map_or(true, |wanted| skin.sub_type() == wanted)
                })
                .collect()
        }
    };
    let display: Vec<DisplaySkin> = skins.iter().map(Skin::display).collect();
    print_skins(&display, format)
}

fn print_skins(skins: &[DisplaySkin], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(skins)?),
        OutputFormat::Text => {
            if skins.is_empty() {
                println!("No skins found.");
            }
            for skin in skins {
                println!("{}", skin.label());
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct AppliedItem {
    slot: String,
    name: Option<String>,
    author: Option<String>,
    location: Option<String>,
}

/// Every slot that has skins, plus any applied slot whose skin is no longer listed.
fn list_applied(app: &App, format: OutputFormat) -> Result<()> {
    let mut slots = app.state.slots();
    for skin in app.state.applied_skins() {
        let slot = skin.slot();
        if !slots.contains(&slot) {
            slots.push(slot);
        }
    }
    slots.sort();

    let items: Vec<AppliedItem> = slots
        .iter()
        .map(|slot| {
            let applied = app.state.applied_skin(slot);
            AppliedItem {
                slot: slot.to_string(),
                name: applied.map(|skin| skin.name.clone()),
                author: applied
                    .map(|skin| skin.author.clone())
                    .filter(|author| !author.is_empty()),
                location: applied.map(|skin| skin.location.display().to_string()),
            }
        })
        .collect();
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&items)?),
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No skins known.");
            }
            for item in &items {
                let name = item.name.as_deref().unwrap_or("(original)");
                println!("{:<32} {name}", item.slot);
            }
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct RefreshOutput {
    local_skins: usize,
    local_error: Option<String>,
    web_skins: usize,
    sources: Vec<SourceOutput>,
}

#[derive(Serialize)]
struct SourceOutput {
    source: String,
    skins: Option<usize>,
    error: Option<String>,
}

fn print_refresh(report: &RefreshReport, format: OutputFormat) -> Result<()> {
    let mut sources: Vec<SourceOutput> = report
        .sources
        .iter()
        .map(|(source, count)| SourceOutput {
            source: source.as_str().to_string(),
            skins: Some(*count),
            error: None,
        })
        .collect();
    sources.extend(report.failed_sources.iter().map(|(source, error)| SourceOutput {
        source: source.to_string(),
        skins: None,
        error: Some(error.clone()),
    }));
    let output = RefreshOutput {
        local_skins: report.local_skins,
        local_error: report.local_error.clone(),
        web_skins: report.sources.iter().map(|(_, count)| count).sum(),
        sources,
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            match &output.local_error {
                Some(error) => println!("Local skins: scan failed ({error})"),
                None => println!("Local skins: {}", output.local_skins),
            }
            for source in &output.sources {
                match (&source.skins, &source.error) {
                    (Some(count), _) => println!("{}: {count} skin(s)", source.source),
                    (None, Some(error)) => println!("{}: failed ({error})", source.source),
                    (None, None) => {}
                }
            }
        }
    }
    Ok(())
}

fn print_apply(outcome: &ApplyOutcome, format: OutputFormat) -> Result<()> {
    let (output, failed) = match outcome {
        ApplyOutcome::Applied { skin, files } => (
            StatusOutput {
                status: "applied",
                detail: Some(format!("{} ({files} file(s))", skin.id())),
            },
            false,
        ),
        ApplyOutcome::ApplyFailed { error } => (
            StatusOutput {
                status: "apply_failed",
                detail: Some(error.clone()),
            },
            true,
        ),
        ApplyOutcome::AbortedBeforeMaterialization { error } => (
            StatusOutput {
                status: "aborted_before_download",
                detail: Some(error.clone()),
            },
            true,
        ),
        ApplyOutcome::AbortedNoBackup => (
            StatusOutput {
                status: "aborted_no_backup",
                detail: None,
            },
            false,
        ),
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => match &output.detail {
            Some(detail) => println!("{}: {detail}", output.status.replace('_', " ")),
            None => println!("{}", output.status.replace('_', " ")),
        },
    }
    if failed {
        bail!("Apply did not complete");
    }
    Ok(())
}

fn print_restore(outcome: &RestoreOutcome, format: OutputFormat) -> Result<()> {
    let output = match outcome {
        RestoreOutcome::Restored { slot, files } => StatusOutput {
            status: "restored",
            detail: Some(format!("{slot} ({files} file(s))")),
        },
        RestoreOutcome::NothingApplied { slot } => StatusOutput {
            status: "nothing_applied",
            detail: Some(slot.to_string()),
        },
        RestoreOutcome::Failed { error } => StatusOutput {
            status: "restore_failed",
            detail: Some(error.clone()),
        },
    };
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => match &output.detail {
            Some(detail) => println!("{}: {detail}", output.status.replace('_', " ")),
            None => println!("{}", output.status.replace('_', " ")),
        },
    }
    if matches!(outcome, RestoreOutcome::Failed { .. }) {
        bail!("Restore did not complete");
    }
    Ok(())
}

#[derive(Serialize)]
struct PathsOutput {
    data_dir: String,
    settings: String,
    game_info: String,
    applied_skins: String,
    cached_skins: String,
    address_books: String,
    skin_types: String,
    downloads: String,
    log: String,
    skins: String,
    game: String,
    executable: Option<String>,
}

fn list_paths(app: &App, format: OutputFormat) -> Result<()> {
    let settings = &app.settings;
    let output = PathsOutput {
        data_dir: settings.data_dir.display().to_string(),
        settings: settings.data_dir.join("settings.json").display().to_string(),
        game_info: settings.game_info_path().display().to_string(),
        applied_skins: settings.applied_skins_path().display().to_string(),
        cached_skins: settings.cached_skins_path().display().to_string(),
        address_books: settings.address_books_path().display().to_string(),
        skin_types: settings.skin_types_path().display().to_string(),
        downloads: settings.downloads_dir().display().to_string(),
        log: settings.log_path().display().to_string(),
        skins: app.skins_root().display().to_string(),
        game: app.game.game_location.display().to_string(),
        executable: app
            .game
            .executable_path()
            .map(|path| path.display().to_string()),
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&output)?),
        OutputFormat::Text => {
            println!("Data dir: {}", output.data_dir);
            println!("Settings: {}", output.settings);
            println!("Game info: {}", output.game_info);
            println!("Applied skins: {}", output.applied_skins);
            println!("Cached skins: {}", output.cached_skins);
            println!("Address books: {}", output.address_books);
            println!("Skin types: {}", output.skin_types);
            println!("Downloads: {}", output.downloads);
            println!("Log: {}", output.log);
            println!("Skins: {}", output.skins);
            println!("Game: {}", output.game);
            if let Some(executable) = &output.executable {
                println!("Executable: {executable}");
            }
            if !app.game.is_game_configured() {
                println!("Warning: game location is not set; edit {}", output.game_info);
            }
        }
    }
    Ok(())
}

fn print_logs(app: &App, mark: usize, verbose: bool) {
    let Some(entries) = app.logs.get(mark..) else {
        return;
    };
    for entry in entries {
        if entry.level == LogLevel::Info && !verbose {
            continue;
        }
        eprintln!("[{}] {}", log_level_label(entry.level), entry.message);
    }
}

fn print_help() {
    println!("SkinSmith v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  skinsmith list [--type T] [--subtype S] [--local-only]   List skins");
    println!("  skinsmith search <text>                 Search skins by name, type or subtype");
    println!("  skinsmith applied                       Show the skin applied in each slot");
    println!("  skinsmith scan                          Re-read the local skins folder from scratch");
    println!("  skinsmith refresh [--web|--local] [--source NAME]  Refresh local and web skins");
    println!("  skinsmith apply <type> <subtype> <name> [--yes]    Back up and apply a skin");
    println!("  skinsmith restore <type> <subtype>      Put the original files back");
    println!("  skinsmith structure [--catalog FILE]    Create the type/subtype folders");
    println!("  skinsmith configure [--game DIR] [--exe FILE] [--skins DIR]  Set game and skins folders");
    println!("  skinsmith start                         Launch the game");
    println!("  skinsmith paths                         Show data and game paths");
    println!();
    println!("Global options:");
    println!("  --format <json|text>            Output format");
    println!("  -v, --verbose                   Also print info messages");
    println!("  -h, --help                      Show help");
    println!("  -V, --version                   Show version");
    println!();
    println!("Environment:");
    println!("  {:<31} Override the data directory", config::DATA_DIR_ENV);
}
