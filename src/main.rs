// ============================================================================
// AYN - Client headless
// ============================================================================
// Programme en ligne de commande qui assemble la couche de résilience :
// - chaque ligne lue sur stdin est un message de chat (limité en débit,
//   mis en file hors-ligne si l'envoi échoue)
// - la file est rejouée périodiquement
// - les derniers prix du flux WebSocket sont affichés périodiquement
//
// Commandes : /prices, /queue, /flush, /tickers AAPL,TSLA, /quit
// ============================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, error, info};

use ayn::app::{AppContext, SendOutcome};
use ayn::config::{parse_tickers, Config};
use ayn::queue::ProcessReport;

// ============================================================================
// Initialisation du logging
// ============================================================================
// Les logs vont dans un fichier pour ne pas se mélanger à la saisie
// ============================================================================

/// Initialise le système de logging vers fichier
///
/// Les logs sont écrits dans ./logs/ayn.log (rotation quotidienne)
///
/// # Utilisation
/// ```bash
/// tail -f logs/ayn.log
/// RUST_LOG=ayn=trace cargo run
/// ```
fn init_logging() -> Result<()> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let log_dir = std::path::PathBuf::from("./logs");
    std::fs::create_dir_all(&log_dir).context("Échec de la création du répertoire de logs")?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, log_dir.clone(), "ayn.log");

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_appender)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true),
        )
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ayn=debug,info".into()),
        )
        .init();

    info!(?log_dir, "Logging initialisé");
    Ok(())
}

// ============================================================================
// Point d'entrée
// ============================================================================

fn main() -> Result<()> {
    init_logging().unwrap_or_else(|e| {
        eprintln!("⚠️  Warning: Failed to initialize logging: {}", e);
        eprintln!("   Continuing without logging...");
    });

    let config = Config::from_env()?;
    info!(tickers = ?config.tickers, feed = %config.price_feed_url, "AYN client starting up");

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(config));

    match &result {
        Ok(_) => info!("AYN client exited normally"),
        Err(e) => error!(error = ?e, "AYN client exited with error"),
    }
    result
}

async fn run(config: Config) -> Result<()> {
    let flush_every = Duration::from_secs(config.queue_flush_secs.max(1));
    let report_every = Duration::from_secs(config.price_report_secs.max(1));

    let mut app = AppContext::from_config(config)?;
    app.start().await;

    // Les passages de la file tournent en tâches de fond : la boucle
    // reste réactive (saisie, Ctrl-C) pendant les envois
    let mut flushes = JoinSet::new();

    if !app.queue().is_empty() {
        println!("📨 {} message(s) en attente restauré(s)", app.queue().len());
        flushes.spawn(app.flush_task());
    }

    println!("✅ Prêt. Tapez un message, ou /prices /queue /flush /tickers /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    // Le premier tick d'un interval est immédiat : on le consomme
    let mut flush = tokio::time::interval(flush_every);
    let mut report = tokio::time::interval(report_every);
    flush.tick().await;
    report.tick().await;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received");
                break;
            }
            line = lines.next_line() => {
                let Some(line) = line.context("Échec de la lecture de stdin")? else {
                    break;
                };

                // Un envoi peut durer jusqu'au timeout HTTP : Ctrl-C reste prioritaire
                tokio::select! {
                    biased;
                    _ = &mut ctrl_c => {
                        info!("Ctrl-C received during send");
                        break;
                    }
                    keep_going = handle_line(&mut app, line.trim(), &mut flushes) => {
                        if !keep_going {
                            break;
                        }
                    }
                }
            }
            _ = flush.tick() => {
                flushes.spawn(app.flush_task());
            }
            Some(finished) = flushes.join_next() => match finished {
                Ok(outcome) => {
                    if outcome.attempted > 0 || !outcome.dropped.is_empty() {
                        print_report(&outcome);
                    }
                }
                Err(e) => error!(error = %e, "Queue flush task failed"),
            },
            _ = report.tick() => print_prices(&app),
        }
    }

    flushes.abort_all();
    app.shutdown().await;
    println!("👋 Au revoir");
    Ok(())
}

/// Traite une ligne saisie ; retourne false pour quitter
async fn handle_line(app: &mut AppContext, line: &str, flushes: &mut JoinSet<ProcessReport>) -> bool {
    match line {
        "" => {}
        "/quit" => return false,
        "/prices" => print_prices(app),
        "/flush" => {
            if app.queue().is_empty() {
                println!("📭 File vide");
            } else {
                flushes.spawn(app.flush_task());
            }
        }
        "/queue" => {
            let pending = app.queue().get_all();
            if pending.is_empty() {
                println!("📭 File vide");
            }
            for message in pending {
                println!(
                    "  {}  {}  (tentatives : {})",
                    message.created_at.format("%H:%M:%S"),
                    message.content,
                    message.retries
                );
            }
        }
        _ if line.starts_with("/tickers") => {
            let tickers = parse_tickers(line.trim_start_matches("/tickers"));
            if app.prices_mut().set_tickers(&tickers).await {
                println!("🔄 Flux de prix : {:?}", app.prices().tickers());
            }
        }
        content => match app.send_message(content, None).await {
            SendOutcome::Sent => println!("✓ Envoyé"),
            SendOutcome::Queued { id } => {
                debug!(id = %id, "Message queued");
                println!("📨 Hors-ligne : message mis en file");
            }
            SendOutcome::RateLimited { retry_in } => {
                println!("⏳ Trop de messages, réessayez dans {}s", retry_in.as_secs() + 1)
            }
        },
    }
    true
}

fn print_prices(app: &AppContext) {
    let prices = app.prices().prices();
    let state = app
        .prices()
        .status()
        .map(|s| s.state.label())
        .unwrap_or("off");

    println!("📊 Prix ({})", state);
    for symbol in app.prices().tickers() {
        match prices.get(symbol) {
            Some(price) => println!("  {}", price.display(symbol)),
            None => println!("  {:<8} {:>12}", symbol, "N/A"),
        }
    }
}

fn print_report(report: &ProcessReport) {
    if report.skipped {
        return;
    }
    println!(
        "📨 File : {} livré(s), {} tentative(s), {} abandonné(s)",
        report.delivered.len(),
        report.attempted,
        report.dropped.len()
    );
    for message in &report.dropped {
        println!("  ✗ abandonné : {}", message.content);
    }
}
