use std::{path::PathBuf, sync::Arc};

use chromiumoxide::browser::{Browser, BrowserConfig};
use clap::{Parser, Subcommand};
use color_eyre::{
	Result,
	eyre::{bail, eyre},
};
use futures::StreamExt;
use question_helper::{
	agent::Agent,
	browser::PageHost,
	config::AppConfig,
	llm::{AnswerClient, FieldsetQuery},
	settings::{FileSettings, SettingsStore},
	vision::{self, Link, VisionWorker},
};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Fieldset sent by `ask` when no file is given
const SAMPLE_FIELDSET: &str = r#"<fieldset id="field" class="sujet6">
  <legend>Question 1/1</legend>
  <h3>Quel mot clé JavaScript pour déclarer une variable locale mutable ?</h3>
  <label><input type="text" name="reponse"></label>
  <input id="submit" type="submit" value="Valider">
</fieldset>"#;

#[derive(Debug, Parser)]
#[command(name = "question_helper")]
#[command(about = "Answers quiz questions in a browser page as you click them", long_about = None)]
struct Args {
	/// Config file (default: $XDG_CONFIG_HOME/question_helper/config.toml)
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
	/// Open a page and watch it for quiz clicks
	Run {
		/// Page to open
		#[arg(short, long)]
		url: String,

		/// Run with visible browser window (non-headless mode)
		#[arg(long)]
		visible: bool,
	},
	/// Show or change the answer service endpoints
	Endpoint {
		/// Operate on the screenshot endpoint instead of the text one
		#[arg(long)]
		vision: bool,

		/// New URL to store
		#[arg(long)]
		set: Option<String>,
	},
	/// Send one fieldset to the text endpoint and print the answer
	Ask {
		/// HTML file holding the fieldset (default: a built-in sample question)
		#[arg(long)]
		html: Option<PathBuf>,
	},
}

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;
	tracing_subscriber::registry()
		.with(fmt::layer())
		.with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("question_helper=info")))
		.init();
	let args = Args::parse();

	let config = match &args.config {
		Some(path) => AppConfig::load(path)?,
		None => match AppConfig::default_path() {
			Some(path) => AppConfig::load(&path)?,
			None => AppConfig::default(),
		},
	};
	let settings = settings_store(&config)?;

	match args.command {
		Command::Run { url, visible } => run(config, settings, &url, visible).await,
		Command::Endpoint { vision, set } => {
			if let Some(url) = set {
				if vision {
					settings.set_vision_endpoint(&url)?;
				} else {
					settings.set_endpoint(&url)?;
				}
				println!("Saved.");
			}
			let current = if vision { settings.vision_endpoint()? } else { settings.endpoint()? };
			println!("{current}");
			Ok(())
		}
		Command::Ask { html } => ask(&config, settings.as_ref(), html).await,
	}
}

fn settings_store(config: &AppConfig) -> Result<Arc<dyn SettingsStore>> {
	let path = match &config.settings_path {
		Some(path) => path.clone(),
		None => FileSettings::default_path().ok_or_else(|| eyre!("Could not determine the config directory; set settings_path"))?,
	};
	Ok(Arc::new(FileSettings::new(path)))
}

async fn ask(config: &AppConfig, settings: &dyn SettingsStore, html: Option<PathBuf>) -> Result<()> {
	let html = match html {
		Some(path) => std::fs::read_to_string(&path).map_err(|e| eyre!("Failed to read {}: {}", path.display(), e))?,
		None => SAMPLE_FIELDSET.to_string(),
	};
	let endpoint = settings.endpoint()?;
	if endpoint.trim().is_empty() {
		bail!("No endpoint configured; set one with `question_helper endpoint --set <URL>`");
	}

	let client = AnswerClient::new(config.request_timeout())?;
	let query = FieldsetQuery {
		url: "http://localhost/test",
		locale: "fr",
		html: &html,
		retry: None,
	};
	let answer = client.ask_fieldset(&endpoint, &query).await?;
	println!("OK. Example answer: {}", if answer.as_str().is_empty() { "(empty)" } else { answer.as_str() });
	Ok(())
}

async fn run(config: AppConfig, settings: Arc<dyn SettingsStore>, url: &str, visible: bool) -> Result<()> {
	let visible = visible || config.visible;
	tracing::info!("Visible mode: {}", visible);

	let browser_config = if visible {
		BrowserConfig::builder()
			.with_head()
			.build()
			.map_err(|e| eyre!("Failed to build browser config: {}", e))?
	} else {
		BrowserConfig::builder().build().map_err(|e| eyre!("Failed to build browser config: {}", e))?
	};

	let (mut browser, mut handler) = Browser::launch(browser_config).await.map_err(|e| eyre!("Failed to launch browser: {}", e))?;

	// Drain browser events so the connection never stalls
	let handle = tokio::spawn(async move { while let Some(_event) = handler.next().await {} });

	let page = browser.new_page("about:blank").await.map_err(|e| eyre!("Failed to create new page: {}", e))?;
	let (host, events) = PageHost::attach(page.clone(), &config.quiz).await?;

	let client = AnswerClient::new(config.request_timeout())?;
	let (observer, worker_end) = vision::link(16);
	let worker = VisionWorker::new(host.clone(), settings.clone(), client.clone());
	let worker_task = tokio::spawn(worker.run(worker_end));

	let Link { tx, rx } = observer;
	let agent = Arc::new(Agent::new(host, &config, settings, client, tx));

	tracing::info!("Navigating to {}", url);
	page.goto(url).await.map_err(|e| eyre!("Failed to navigate: {}", e))?;

	tracing::info!(
		"Watching for quiz clicks ({}). Toggle with {}, screenshot mode with {:?}. Press Ctrl+C to exit...",
		if agent.session().is_enabled() { "enabled" } else { "disabled" },
		config.toggle_key_code,
		config.vision_key
	);
	tokio::select! {
		_ = agent.clone().run(events, rx) => tracing::info!("Page closed"),
		r = tokio::signal::ctrl_c() => r?,
	}

	worker_task.abort();
	drop(page);
	browser.close().await.map_err(|e| eyre!("Failed to close browser: {}", e))?;
	drop(browser);
	handle.abort();

	Ok(())
}
