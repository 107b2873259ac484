use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{LevelFilter, info, warn};
use simplelog::{Config, WriteLogger};

use pagelight::analysis::{self, AnalysisResult, LayoutAnalysis};
use pagelight::export;
use pagelight::panic_handler::initialize_panic_handler;
use pagelight::settings::{Settings, load_settings};
use pagelight::viewer::{
    HighlightDispatch, HighlightIntent, PaperDocument, PaperPage, PaperProvider, RenderScheduler,
    Viewer, ViewerEvent,
};

#[derive(Parser)]
#[command(name = "pagelight")]
#[command(about = "Render a document page and highlight extracted fields on it")]
struct Cli {
    /// Paper manifest: {"pages": [{"width": 612, "height": 792}, ...]}
    #[arg(long)]
    manifest: Option<PathBuf>,

    /// Number of blank letter pages when no manifest is given
    #[arg(long)]
    pages: Option<usize>,

    /// Field extraction result (documents[].fields)
    #[arg(short, long)]
    result: Option<PathBuf>,

    /// Layout result (pages{n: {lines, words, images}})
    #[arg(short, long)]
    layout: Option<PathBuf>,

    /// Page to show (1-based)
    #[arg(short, long)]
    page: Option<usize>,

    /// Highlight this field of the result
    #[arg(short, long)]
    field: Option<String>,

    /// Highlight the first layout line or word containing this text
    #[arg(short, long)]
    search: Option<String>,

    /// Highlight entry N of the layout's image list
    #[arg(long)]
    image: Option<usize>,

    /// Draw every field, or every layout element, on each page
    #[arg(long)]
    show_all: bool,

    /// Write the page and its highlights to this PNG
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// Settings file (defaults to the user config directory)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<LevelFilter>,

    #[arg(long, default_value = "pagelight.log")]
    log_file: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    initialize_panic_handler();

    let settings = load_settings(cli.config.as_deref());
    let level = cli.log_level.unwrap_or_else(|| settings.log_level());
    WriteLogger::init(
        level,
        Config::default(),
        File::create(&cli.log_file)
            .with_context(|| format!("cannot create log file {:?}", cli.log_file))?,
    )?;
    info!("Starting pagelight");

    let result = cli
        .result
        .as_ref()
        .map(|path| read_json(path, AnalysisResult::from_json))
        .transpose()?;
    let layout = cli
        .layout
        .as_ref()
        .map(|path| read_json(path, LayoutAnalysis::from_json))
        .transpose()?;

    let mut viewer = Viewer::new(RenderScheduler::with_params(settings.render_params()));
    load_document(&mut viewer, &cli, result.as_ref())?;
    report(&viewer.wait_idle());

    if cli.show_all {
        let mut annotations = vec![];
        if let Some(result) = &result {
            annotations.extend(result.annotations(settings.styles.selection));
        }
        if let Some(layout) = &layout {
            annotations.extend(layout.annotations());
        }
        info!("Showing {} annotations", annotations.len());
        viewer.show_all(annotations);
    }

    let highlighted = highlight(&mut viewer, &cli, &settings, result.as_ref(), layout.as_ref())?;
    if !highlighted {
        if let Some(page) = cli.page {
            let _ = viewer.scheduler_mut().request_render(page);
        }
    }
    report(&viewer.wait_idle());

    if let Some(rendered) = viewer.scheduler().rendered() {
        println!(
            "page {} of {}: {}x{} px, {} text runs, {} overlays",
            rendered.page,
            viewer.scheduler().page_count(),
            rendered.viewport.pixel_size().0,
            rendered.viewport.pixel_size().1,
            rendered.text.len(),
            viewer.overlays().len()
        );
    }

    if let Some(out) = &cli.out {
        export::save_snapshot(viewer.scheduler(), out)
            .with_context(|| format!("cannot export {out:?}"))?;
        println!("wrote {}", out.display());
    }

    info!("Done");
    Ok(())
}

fn read_json<T, E>(path: &Path, parse: impl FnOnce(&str) -> Result<T, E>) -> Result<T>
where
    E: std::error::Error + Send + Sync + 'static,
{
    let json = fs::read_to_string(path).with_context(|| format!("cannot read {path:?}"))?;
    parse(&json).with_context(|| format!("cannot parse {path:?}"))
}

fn load_document(viewer: &mut Viewer, cli: &Cli, result: Option<&AnalysisResult>) -> Result<()> {
    if let Some(manifest) = &cli.manifest {
        let bytes = fs::read(manifest).with_context(|| format!("cannot read {manifest:?}"))?;
        viewer
            .load_document(&PaperProvider, &bytes)
            .with_context(|| format!("cannot load {manifest:?}"))?;
        return Ok(());
    }

    let pages = match (cli.pages, result.and_then(AnalysisResult::paper_pages)) {
        (Some(0), _) => bail!("--pages must be at least 1"),
        (Some(count), _) => vec![PaperPage::letter(); count],
        (None, Some(pages)) => pages,
        (None, None) => {
            let needed = cli.page.unwrap_or(1).max(1);
            vec![PaperPage::letter(); needed]
        }
    };
    let document = PaperDocument::new(pages).context("invalid page sizes")?;
    let _ = viewer.set_document(Arc::new(document));
    Ok(())
}

/// Start the requested highlight, if any. Returns whether one was started.
fn highlight(
    viewer: &mut Viewer,
    cli: &Cli,
    settings: &Settings,
    result: Option<&AnalysisResult>,
    layout: Option<&LayoutAnalysis>,
) -> Result<bool> {
    let styles = &settings.styles;

    if let Some(name) = &cli.field {
        let Some(result) = result else {
            bail!("--field needs --result");
        };
        let Some(field) = result.field(name) else {
            bail!("no field named {name:?} in the result");
        };
        let regions = field.valid_regions();
        let Some(first) = regions.first() else {
            bail!("field {name:?} has no drawable region");
        };
        let page = cli.page.unwrap_or(first.page_number);
        println!(
            "{name}: {:?} (confidence {:?})",
            field.content.as_deref().unwrap_or(""),
            field.confidence
        );
        let dispatch =
            viewer.activate_field(&regions, HighlightIntent::Navigate(page), styles.selection)?;
        describe(dispatch);
        return Ok(true);
    }

    if let Some(term) = &cli.search {
        let Some(layout) = layout else {
            bail!("--search needs --layout");
        };
        let hits = analysis::search(layout, term);
        println!("{} hits for {term:?}", hits.len());
        let hit = match cli.page {
            Some(page) => hits.iter().find(|hit| hit.page == page),
            None => hits.first(),
        };
        let Some(hit) = hit else {
            warn!("No search hit to highlight");
            return Ok(false);
        };
        println!("highlighting {:?} on page {}", hit.text, hit.page);
        describe(viewer.activate(&hit.region, styles.selection)?);
        return Ok(true);
    }

    if let Some(index) = cli.image {
        let Some(layout) = layout else {
            bail!("--image needs --layout");
        };
        let Some(region) = layout.image_region(index) else {
            bail!("no image {index} in the layout");
        };
        describe(viewer.activate(&region, styles.image_focus)?);
        return Ok(true);
    }

    Ok(false)
}

fn describe(dispatch: HighlightDispatch) {
    match dispatch {
        HighlightDispatch::Drawn => println!("highlight drawn"),
        HighlightDispatch::Deferred { page } => println!("rendering page {page} first"),
        HighlightDispatch::Missed { page } => println!("nothing to highlight on page {page}"),
    }
}

fn report(events: &[ViewerEvent]) {
    for event in events {
        match event {
            ViewerEvent::PageRendered(rendered) => {
                println!("rendered page {}/{}", rendered.page, rendered.page_count);
            }
            ViewerEvent::RenderFailed { page, error } => {
                eprintln!("page {page} failed: {error}");
            }
            ViewerEvent::HighlightDrawn { page } => println!("highlight drawn on page {page}"),
            ViewerEvent::HighlightSkipped { page, error } => {
                eprintln!("highlight on page {page} skipped: {error}");
            }
            ViewerEvent::HighlightMissed { page } => {
                println!("nothing to highlight on page {page}");
            }
            ViewerEvent::WorkerLost => eprintln!("render worker stopped"),
        }
    }
}
