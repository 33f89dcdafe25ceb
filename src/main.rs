use clap::Parser;
use ratatui::DefaultTerminal;
use std::process::ExitCode;
use tracing::{debug, error, info};

mod columns;
mod controller;
mod domain;
mod export;
mod inputter;
mod logging;
mod model;
mod pipeline;
mod record;
mod source;
mod submit;
mod ui;

use columns::{ColumnRegistry, SortDirection};
use controller::Controller;
use domain::{DEFAULT_EXPORT_PATH, DEFAULT_PAGE_SIZE, DEFAULT_SOURCE, PTVConfig, PTVError};
use logging::LoggingConfig;
use model::{Model, Status};
use pipeline::{Pagination, ViewState};
use record::{Field, RecordStore};
use source::{DataSource, expand_path};
use ui::TableUI;

#[derive(Parser, Debug)]
#[command(name = "ptv", version)]
#[command(about = "Browse, search, filter, sort and export procurement records", long_about = None)]
struct Args {
    /// Url, .json or .csv file to load the records from
    #[arg(default_value = DEFAULT_SOURCE)]
    source: String,

    /// TOML file with [[columns]] tables replacing the built-in columns
    #[arg(long)]
    columns: Option<String>,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    /// Endpoint the form is posted to; the form is disabled without it
    #[arg(long)]
    submit_url: Option<String>,

    /// Default path offered by the export prompt
    #[arg(long, default_value = DEFAULT_EXPORT_PATH)]
    export_path: String,

    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    #[arg(long)]
    log_file: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write the derived page to PATH and exit without starting the ui
    #[arg(long, value_name = "PATH")]
    export: Option<String>,

    #[arg(long, requires = "export")]
    search: Option<String>,

    #[arg(long = "filter", value_name = "KEY=TEXT")]
    filters: Vec<String>,

    #[arg(long = "sort", value_name = "KEY[:asc|:desc]")]
    sorts: Vec<String>,

    #[arg(long, default_value_t = 1, requires = "export")]
    page: usize,
}

fn main() -> ExitCode {
    let args = Args::parse();
    match run(args) {
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}

fn run(args: Args) -> Result<(), PTVError> {
    let logging = LoggingConfig {
        log_file: args.log_file.as_deref().map(expand_path).transpose()?,
        level: args.log_level.clone(),
    };
    let _guard = logging::init(&logging)?;

    let config = build_config(&args)?;
    info!("Starting ptv on {}", config.source);

    match &args.export {
        Some(path) => export_headless(&config, &args, path),
        None => run_tui(&config),
    }
}

fn parse_filter(arg: &str) -> Result<(Field, String), PTVError> {
    let (key, text) = arg
        .split_once('=')
        .ok_or_else(|| PTVError::Config(format!("filter \"{arg}\" is not KEY=TEXT")))?;
    Ok((key.trim().parse()?, text.to_string()))
}

fn parse_sort(arg: &str) -> Result<(Field, SortDirection), PTVError> {
    let (key, direction) = arg.split_once(':').unwrap_or((arg, "asc"));
    let direction = SortDirection::parse(direction.trim())
        .ok_or_else(|| PTVError::Config(format!("unknown sort direction in \"{arg}\"")))?;
    Ok((key.trim().parse()?, direction))
}

/// Presets filters and sorts from the command line on the column registry.
fn apply_column_args(columns: &mut ColumnRegistry, args: &Args) -> Result<(), PTVError> {
    for arg in &args.filters {
        let (field, text) = parse_filter(arg)?;
        if columns.get(field).is_none() {
            return Err(PTVError::Config(format!("column {field} is not configured")));
        }
        columns.set_filter(field, &text);
    }
    for arg in &args.sorts {
        let (field, direction) = parse_sort(arg)?;
        if columns.get(field).is_none() {
            return Err(PTVError::Config(format!("column {field} is not configured")));
        }
        columns.set_sort(field, direction);
    }
    Ok(())
}

fn build_config(args: &Args) -> Result<PTVConfig, PTVError> {
    if args.page_size == 0 {
        return Err(PTVError::Config("page size must be at least 1".into()));
    }
    let mut columns = match &args.columns {
        Some(path) => ColumnRegistry::load(&expand_path(path)?)?,
        None => ColumnRegistry::default(),
    };
    apply_column_args(&mut columns, args)?;

    Ok(PTVConfig::default()
        .with_source(args.source.clone())
        .with_columns(columns)
        .with_page_size(args.page_size)
        .with_submit_url(args.submit_url.clone())
        .with_export_path(args.export_path.clone())
        .with_event_poll_time(args.poll_ms))
}

fn headless_state(config: &PTVConfig, args: &Args) -> ViewState {
    let mut pagination = Pagination::new(config.page_size);
    pagination.current_page = args.page;
    ViewState {
        search: args.search.clone().unwrap_or_default().trim().to_string(),
        columns: config.columns.clone(),
        pagination,
    }
}

fn export_headless(config: &PTVConfig, args: &Args, path: &str) -> Result<(), PTVError> {
    let source = DataSource::parse(&config.source)?;
    let store = RecordStore::load(source.fetch()?, &config.columns)?;
    let state = headless_state(config, args);
    let view = pipeline::run(store.records(), &state)?;

    let target = expand_path(path)?;
    let grid = export::worksheet(&view.rows, &state.columns);
    let rows = export::write_worksheet(&grid, &target)?;
    println!(
        "Exported {rows} rows (page {}/{}, {} of {} records) to {}",
        view.pagination.current_page,
        view.total_pages(),
        view.total_items,
        view.fetched_items,
        target.display()
    );
    Ok(())
}

fn run_tui(config: &PTVConfig) -> Result<(), PTVError> {
    let source = DataSource::parse(&config.source)?;
    let mut model = Model::init(config)?;
    let ui = TableUI::new(config);
    let controller = Controller::new(config);

    let mut terminal = ratatui::init();
    model.start_fetch(source);
    let result = event_loop(&mut terminal, &mut model, &ui, &controller);
    ratatui::restore();

    match &result {
        Ok(_) => {
            let view = model.derived_view();
            info!("Leaving with {} of {} records matching", view.total_items, view.fetched_items);
            debug!("Final view state: {}", serde_json::to_string(model.view_state())?);
        }
        Err(e) => error!("Stopped with error: {e}"),
    }
    result
}

fn event_loop(
    terminal: &mut DefaultTerminal,
    model: &mut Model,
    ui: &TableUI,
    controller: &Controller,
) -> Result<(), PTVError> {
    while model.status != Status::QUITTING {
        // Render the current view
        terminal.draw(|f| ui.draw(model, f))?;

        // Handle events and map to a Message, None still polls the fetch
        let message = controller.handle_event(model)?;
        model.update(message)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(extra: &[&str]) -> Args {
        let mut argv = vec!["ptv"];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv).unwrap()
    }

    #[test]
    fn parses_filter_and_sort_specs() {
        assert_eq!(
            parse_filter("name=aspirin").unwrap(),
            (Field::Name, "aspirin".to_string())
        );
        assert_eq!(parse_filter("unit=").unwrap(), (Field::Unit, String::new()));
        assert!(matches!(parse_filter("name"), Err(PTVError::Config(_))));
        assert!(matches!(parse_filter("price=1"), Err(PTVError::UnknownField(_))));

        assert_eq!(parse_sort("num").unwrap(), (Field::Num, SortDirection::Asc));
        assert_eq!(parse_sort("num:desc").unwrap(), (Field::Num, SortDirection::Desc));
        assert!(matches!(parse_sort("num:up"), Err(PTVError::Config(_))));
    }

    #[test]
    fn builds_config_from_args() {
        let args = args(&[
            "data.json",
            "--page-size",
            "25",
            "--filter",
            "unit=mg",
            "--sort",
            "name:desc",
        ]);
        let config = build_config(&args).unwrap();
        assert_eq!(config.source, "data.json");
        assert_eq!(config.page_size, 25);
        assert_eq!(config.columns.active_filters().len(), 1);
        assert_eq!(
            config.columns.get(Field::Name).unwrap().sort,
            SortDirection::Desc
        );
        assert_eq!(config.submit_url, None);
        assert_eq!(config.export_path, "purchases.xlsx");
    }

    #[test]
    fn rejects_invalid_args() {
        assert!(build_config(&args(&["--page-size", "0"])).is_err());
        assert!(build_config(&args(&["--filter", "multiplicity=2"])).is_err());
        assert!(Args::try_parse_from(["ptv", "--search", "x"]).is_err());
    }

    #[test]
    fn exports_without_ui() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("purchases.json");
        std::fs::write(
            &source,
            r#"[
                {"mnn_id": 1, "subtype": "A", "num": 3, "name": "Aspirin", "release_form": "tablets", "dosage": "500", "unit": "mg"},
                {"mnn_id": 2, "subtype": "A", "num": 1, "name": "Aspirin C", "release_form": "tablets", "dosage": "400", "unit": "mg"},
                {"mnn_id": 3, "subtype": "B", "num": 2, "name": "Ibuprofen", "release_form": "gel", "dosage": "5", "unit": "g"}
            ]"#,
        )
        .unwrap();
        let target = dir.path().join("out.csv");

        let args = args(&[
            source.to_str().unwrap(),
            "--export",
            target.to_str().unwrap(),
            "--search",
            "aspirin",
            "--sort",
            "num",
        ]);
        let config = build_config(&args).unwrap();
        export_headless(&config, &args, args.export.as_deref().unwrap()).unwrap();

        let content = std::fs::read_to_string(&target).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].contains("Aspirin C"));
        assert!(lines[2].contains("Aspirin"));
    }
}
