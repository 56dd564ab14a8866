use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use wikibots_core::api::{MediaWikiClient, WikiReadApi, WikiWriteApi};
use wikibots_core::bots::regex::{RegexOptions, RegexRule};
use wikibots_core::bots::replace::ReplaceOptions;
use wikibots_core::bots::{
    airport, backlink, banner, banner_rail, destain, disambig, mover, punctuation, railway, rdt,
    regex, regex_replace, replace, revert,
};
use wikibots_core::config::{BotConfig, DEFAULT_CONFIG_FILENAME, load_config};
use wikibots_core::confirm::{EditSettings, Editor, Mode, RetryPolicy};
use wikibots_core::console;
use wikibots_core::prompt::StdinPrompter;
use wikibots_core::session::open_session;
use wikibots_core::signal::StopSignal;
use wikibots_core::stats::RunStats;

#[derive(Debug, Parser)]
#[command(
    name = "wikibots",
    version,
    about = "Maintenance bots for MediaWiki sites"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH", default_value = DEFAULT_CONFIG_FILENAME)]
    config: PathBuf,
    #[arg(long, global = true, value_name = "HOST", help = "Wiki host, replacing the configured one")]
    host: Option<String>,
    #[arg(short = 'y', long, global = true, help = "Save without prompting")]
    yes: bool,
    #[arg(short, long, global = true, help = "Log progress to stderr")]
    verbose: bool,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Sign in and report the account in use")]
    Login,
    #[command(about = "Replace a literal phrase on every page the search finds")]
    Replace(ReplaceArgs),
    #[command(about = "Replace 丶 used as an enumeration comma with 、")]
    Punctuation,
    #[command(about = "Regex substitution on pages transcluding a template")]
    Regex(RegexArgs),
    #[command(about = "Regex substitution on insource: search hits, saved unattended")]
    RegexReplace(RegexReplaceArgs),
    #[command(about = "Remove colour templates from metro station lists")]
    Destain(DestainArgs),
    #[command(about = "Point the links on one page at a new title")]
    Backlink(BacklinkArgs),
    #[command(about = "Triage links to a disambiguation page")]
    Disambig(DisambigArgs),
    #[command(about = "Add a WikiProject banner to talk pages")]
    Banner(BannerArgs),
    #[command(about = "Banner rail route talk pages with a guessed WikiProject")]
    BannerRail(BannerRailArgs),
    #[command(about = "Create redirects at airport IATA and ICAO codes")]
    Airport(EditArgs),
    #[command(about = "Fill telegraph and pinyin codes into station infoboxes")]
    Railway(RailwayArgs),
    #[command(about = "Move a parenthetical title to its corrected spelling")]
    Mover(MoverArgs),
    #[command(about = "Restore the revision before the bot's last edit, titles read from stdin")]
    Revert(EditArgs),
    #[command(about = "Convert BS route diagram rows on stdin to Routemap")]
    Rdt,
}

/// Trailing positionals shared by every editing bot.
#[derive(Debug, Args)]
struct EditArgs {
    summary: String,
    #[arg(value_name = "MINOR", help = "Any value marks the edits minor")]
    minor: Option<String>,
}

#[derive(Debug, Args)]
struct ReplaceArgs {
    pattern: String,
    replacement: String,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct RegexArgs {
    template: String,
    #[arg(help = "Rust regex syntax; lookaround and backreferences are not supported")]
    pattern: String,
    replacement: String,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct RegexReplaceArgs {
    #[arg(help = "Rust regex syntax; lookaround and backreferences are not supported")]
    pattern: String,
    replacement: String,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct DestainArgs {
    #[arg(help = "Comma-separated presets: nanchang, tianjin")]
    cities: String,
    #[arg(value_name = "MINOR", help = "Any value marks the edits minor")]
    minor: Option<String>,
}

#[derive(Debug, Args)]
struct BacklinkArgs {
    page: String,
    src: String,
    dest: String,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct DisambigArgs {
    page: String,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct BannerArgs {
    #[arg(help = "Comma-separated template names")]
    templates: String,
    banner: String,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct BannerRailArgs {
    #[arg(long, value_name = "PATH", default_value = banner_rail::DEFAULT_LOG)]
    log: PathBuf,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct RailwayArgs {
    #[arg(long, value_name = "PATH", default_value = railway::DEFAULT_STATIONS)]
    stations: PathBuf,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct MoverArgs {
    corrected: String,
    #[command(flatten)]
    edit: EditArgs,
}

/// A bot with its inputs validated, ready to run once signed in.
enum Bot {
    Login,
    Replace(ReplaceOptions),
    Regex(RegexOptions),
    RegexReplace(RegexRule),
    Destain(Vec<RegexOptions>),
    Backlink {
        page: String,
        src: String,
        dest: String,
    },
    Disambig(String),
    Banner {
        templates: Vec<String>,
        banner: String,
    },
    BannerRail(PathBuf),
    Airport,
    Railway(railway::StationDb),
    Mover(String),
    Revert,
}

struct Job {
    bot: Bot,
    summary: String,
    minor: bool,
    mode: Mode,
}

impl Job {
    fn prepare(command: Commands, yes: bool) -> Result<Self> {
        let prompted = if yes { Mode::Automatic } else { Mode::Interactive };
        let job = |bot, summary: String, minor: bool, mode| Self {
            bot,
            summary,
            minor,
            mode,
        };

        Ok(match command {
            Commands::Login => job(Bot::Login, String::new(), false, Mode::Automatic),
            Commands::Replace(args) => job(
                Bot::Replace(ReplaceOptions::new(&args.pattern, &args.replacement)?),
                args.edit.summary,
                args.edit.minor.is_some(),
                prompted,
            ),
            Commands::Punctuation => job(
                Bot::Replace(punctuation::options()),
                punctuation::SUMMARY.to_string(),
                true,
                prompted,
            ),
            Commands::Regex(args) => job(
                Bot::Regex(RegexOptions {
                    template: args.template,
                    rule: RegexRule::new(&args.pattern, &args.replacement)?,
                }),
                args.edit.summary,
                args.edit.minor.is_some(),
                prompted,
            ),
            Commands::RegexReplace(args) => job(
                Bot::RegexReplace(RegexRule::new(&args.pattern, &args.replacement)?),
                args.edit.summary,
                args.edit.minor.is_some(),
                Mode::Automatic,
            ),
            Commands::Destain(args) => job(
                Bot::Destain(destain::presets(&args.cities)?),
                destain::SUMMARY.to_string(),
                args.minor.is_some(),
                prompted,
            ),
            Commands::Backlink(args) => job(
                Bot::Backlink {
                    page: args.page,
                    src: args.src,
                    dest: args.dest,
                },
                args.edit.summary,
                args.edit.minor.is_some(),
                prompted,
            ),
            Commands::Disambig(args) => job(
                Bot::Disambig(args.page),
                args.edit.summary,
                args.edit.minor.is_some(),
                prompted,
            ),
            Commands::Banner(args) => {
                let minor = args.edit.minor.is_some();
                let mode = if minor { Mode::Automatic } else { prompted };
                job(
                    Bot::Banner {
                        templates: split_list(&args.templates),
                        banner: args.banner,
                    },
                    args.edit.summary,
                    minor,
                    mode,
                )
            }
            Commands::BannerRail(args) => job(
                Bot::BannerRail(args.log),
                args.edit.summary,
                args.edit.minor.is_some(),
                Mode::Automatic,
            ),
            Commands::Airport(args) => job(
                Bot::Airport,
                args.summary,
                args.minor.is_some(),
                Mode::Automatic,
            ),
            Commands::Railway(args) => job(
                Bot::Railway(railway::StationDb::load(&args.stations)?),
                args.edit.summary,
                args.edit.minor.is_some(),
                prompted,
            ),
            Commands::Mover(args) => {
                mover::trailing_candidates(&args.corrected)?;
                job(
                    Bot::Mover(args.corrected),
                    args.edit.summary,
                    args.edit.minor.is_some(),
                    prompted,
                )
            }
            Commands::Revert(args) => job(
                Bot::Revert,
                args.summary,
                args.minor.is_some(),
                prompted,
            ),
            Commands::Rdt => bail!("rdt converts stdin offline and takes no wiki session"),
        })
    }

    /// Runs the bot and returns its tally even when it stops on an error.
    fn run(
        self,
        client: &MediaWikiClient,
        config: &BotConfig,
        stop: StopSignal,
    ) -> (RunStats, Result<()>) {
        let settings = EditSettings {
            summary: self.summary,
            minor: self.minor,
            mode: self.mode,
            retry: RetryPolicy::from_config(config),
        };
        let editor = Editor::new(client, settings, StdinPrompter::new(stop.clone()), stop);
        let workers = config.concurrency();
        let bot = &self.bot;

        editor.run(|editor| match bot {
            Bot::Login => {
                let username = client.username().unwrap_or_default();
                println!("Signed in as {username}.");
                Ok(())
            }
            Bot::Replace(options) => replace::run(editor, options),
            Bot::Regex(options) => regex::run(editor, options),
            Bot::RegexReplace(rule) => regex_replace::run(editor, rule),
            Bot::Destain(presets) => destain::run(editor, presets),
            Bot::Backlink { page, src, dest } => backlink::run(editor, page, src, dest),
            Bot::Disambig(page) => disambig::run(editor, page),
            Bot::Banner { templates, banner } => banner::run(editor, templates, banner),
            Bot::BannerRail(log) => banner_rail::run(editor, workers, log),
            Bot::Airport => airport::run(editor, workers),
            Bot::Railway(stations) => railway::run(editor, stations).map(drop),
            Bot::Mover(corrected) => mover::run(editor, corrected),
            Bot::Revert => revert::run(editor),
        })
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    dotenvy::dotenv().ok();

    let Some(command) = cli.command else {
        let mut command = Cli::command();
        command.print_help()?;
        println!();
        return Ok(());
    };
    if let Commands::Rdt = command {
        return rdt::convert(io::stdin().lock(), io::stdout().lock());
    }

    let mut config = load_config(&cli.config)?;
    if let Some(host) = cli.host {
        config.wiki.host = Some(host);
        config.wiki.api_url = None;
    }
    let job = Job::prepare(command, cli.yes)?;
    let reports_stats = !matches!(job.bot, Bot::Login);

    let client = open_session(&config)?;
    let stop = StopSignal::new();
    install_interrupt_handler(&stop)?;

    let (stats, result) = job.run(&client, &config, stop);
    info!(
        edited = stats.edited,
        ignored = stats.ignored,
        errors = stats.errors,
        requests = client.request_count(),
        "run finished"
    );
    if reports_stats {
        console::print_stats(&stats);
    }
    result
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| default.into()))
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// The first Ctrl-C lets the current page finish and ends any waiting
/// prompt, the second exits at once.
fn install_interrupt_handler(stop: &StopSignal) -> Result<()> {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
        if stop.raise() {
            std::process::exit(130);
        }
        eprintln!("\nStopping after the current page. Press Ctrl-C again to quit now.");
    })
    .context("failed to install Ctrl-C handler")
}

fn split_list(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToString::to_string)
        .collect()
}
