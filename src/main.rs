use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{debug, info};
use ox_adaptive_forms::{decorate, extract_code_block, PageLocation};
use ox_forms::config::FormsConfig;
use ox_forms::context::FormContext;
use ox_forms::dom::{el, Document};
use ox_forms::http::{HttpClient, OfflineClient, ReqwestClient};
use ox_forms::registry::ComponentRegistry;
use ox_forms_components::register_standard_components;
use ox_forms_rules::FormRuntimeFactory;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

/// Renders a form definition (JSON, or an HTML page embedding one in
/// `<pre><code>`) and prints the resulting `<form>` markup.
#[derive(Parser, Debug)]
#[command(name = "ox_forms_render", author, version, about, long_about = None)]
struct Cli {
    file: PathBuf,
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(short, long)]
    log_level: Option<String>,
    /// Origin used to resolve prefill and option requests; offline when absent.
    #[arg(short, long)]
    origin: Option<String>,
    /// Query string passed to the form as request context.
    #[arg(short, long, default_value = "")]
    search: String,
    /// Render the authoring view without the rule engine.
    #[arg(long)]
    authoring: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => FormsConfig::load(path).with_context(|| format!("loading config {}", path.display()))?,
        None => FormsConfig::default(),
    };
    let level = cli
        .log_level
        .clone()
        .or_else(|| config.log_level.clone())
        .unwrap_or_else(|| "info".to_string());
    env_logger::Builder::new().parse_filters(&level).init();
    debug!("CLI arguments: {:?}", cli);

    let content = fs::read_to_string(&cli.file).with_context(|| format!("reading {}", cli.file.display()))?;
    let raw = if content.trim_start().starts_with('<') {
        extract_code_block(&content).ok_or_else(|| anyhow!("{} has no <pre><code> form block", cli.file.display()))?
    } else {
        content
    };

    let http: Arc<dyn HttpClient> = match &cli.origin {
        Some(origin) => Arc::new(ReqwestClient::with_origin(origin).context("invalid --origin")?),
        None => Arc::new(OfflineClient),
    };
    let mut registry = ComponentRegistry::new();
    register_standard_components(&mut registry);

    let document = Document::new();
    let base = FormContext::builder(document.clone())
        .config(Arc::new(config))
        .registry(Arc::new(registry))
        .http(http)
        .build();

    let block = el(&document, "div").class("form").build();
    if cli.authoring {
        block.add_class("edit-mode");
    }
    let pre = document.create_element("pre");
    pre.append(&el(&document, "code").text(&raw).build());
    block.append(&pre);
    document.body().append(&block);

    let location = PageLocation {
        origin: cli.origin.clone(),
        pathname: cli.file.display().to_string(),
        search: cli.search.clone(),
        cookies: String::new(),
    };
    let decorated = decorate(&block, &base, &location, Arc::new(FormRuntimeFactory))
        .await
        .ok_or_else(|| anyhow!("no form could be rendered from {}", cli.file.display()))?;

    info!("Rendered form '{}'", decorated.form().data("id").unwrap_or_default());
    println!("{}", decorated.form().to_html());
    Ok(())
}
