//! lumen-cli — command-line frontend for the Lumen analysis service
//!
//! Talks to the Lumen HTTP API and renders saved analysis records and
//! dashboard summaries for the terminal.
//!
//! # Subcommands
//! - `list [--json]`                   — all saved records, newest first
//! - `summary [--window <w>] [--json]` — windowed dashboard statistics
//! - `status`                          — show server health

use clap::{Parser, Subcommand};
use serde::Deserialize;

const DEFAULT_SERVER: &str = "http://127.0.0.1:8750";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "lumen-cli",
    version,
    about = "Lumen image-analysis records — CLI client"
)]
struct Cli {
    /// Lumen HTTP server URL (overrides LUMEN_HTTP_URL env var)
    #[arg(long, env = "LUMEN_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List all saved analysis records, newest first
    List {
        /// Output raw JSON instead of the human-readable report
        #[arg(long)]
        json: bool,
    },

    /// Show dashboard statistics for a time window
    Summary {
        /// Time window: today, last-week, last-month, last-year or lifetime
        #[arg(short, long, default_value = "lifetime")]
        window: String,

        /// Output raw JSON instead of the human-readable report
        #[arg(long)]
        json: bool,
    },

    /// Show Lumen server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiBoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiAnalysisResult {
    pub probability: f64,
    pub bounding_box: Option<ApiBoundingBox>,
    pub processing_time_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct ApiComment {
    pub text: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRecord {
    pub id: String,
    pub image_ref: String,
    pub analysis_result: ApiAnalysisResult,
    pub comments: Vec<ApiComment>,
    pub created_at: String,
}

// ============================================================================
// Formatting helpers (pure)
// ============================================================================

/// Render a probability as a percentage with two decimals, e.g. "91.23%".
pub fn format_probability(probability: f64) -> String {
    format!("{:.2}%", probability * 100.0)
}

/// Render a bounding box on one line, or "none" when absent.
pub fn format_bounding_box(bbox: Option<&ApiBoundingBox>) -> String {
    match bbox {
        Some(b) => format!(
            "x={:.3} y={:.3} w={:.3} h={:.3}",
            b.x, b.y, b.width, b.height
        ),
        None => "none".to_string(),
    }
}

/// Render one record as a report block.
pub fn format_record(index: usize, record: &ApiRecord) -> String {
    format!(
        "Record {}:\n\
         ID:                    {}\n\
         Image Ref:             {}\n\
         Detection Probability: {}\n\
         Bounding Box:          {}\n\
         Processing Time:       {} ms\n\
         Comments:              {}\n\
         Created At:            {}",
        index + 1,
        record.id,
        record.image_ref,
        format_probability(record.analysis_result.probability),
        format_bounding_box(record.analysis_result.bounding_box.as_ref()),
        record.analysis_result.processing_time_ms,
        record.comments.len(),
        record.created_at,
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client() -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

/// Fetch and print all saved records.
fn do_list(server: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/records", server);
    let resp = match client()?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("lumen-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("lumen-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    if json_output {
        println!("{}", resp.text()?);
        return Ok(());
    }

    let records: Vec<ApiRecord> = match resp.json() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("lumen-cli: failed to parse records response: {}", e);
            std::process::exit(1);
        }
    };

    println!("Found saved records: {}", records.len());
    println!("----------------------------------------");
    for (index, record) in records.iter().enumerate() {
        println!("{}", format_record(index, record));
        println!("----------------------------------------");
    }

    Ok(())
}

/// Fetch and print the dashboard summary for a window.
fn do_summary(server: &str, window: &str, json_output: bool) -> anyhow::Result<()> {
    let url = format!("{}/dashboard/summary?window={}", server, window);
    let resp = match client()?.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("lumen-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("lumen-cli: server returned {}: {}", status, body);
        std::process::exit(1);
    }

    let summary: serde_json::Value = match resp.json() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("lumen-cli: failed to parse summary response: {}", e);
            std::process::exit(1);
        }
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Window:            {}", summary["window"].as_str().unwrap_or(window));
    println!("Total Records:     {}", summary["totalCount"]);
    println!(
        "Avg Probability:   {}",
        format_probability(summary["averageProbability"].as_f64().unwrap_or(0.0))
    );
    println!(
        "Avg Latency:       {:.0} ms",
        summary["averageProcessingTimeMs"].as_f64().unwrap_or(0.0)
    );
    println!(
        "Distribution:      {} positive / {} negative",
        summary["classDistribution"]["positive"], summary["classDistribution"]["negative"]
    );

    if let Some(entries) = summary["recentActivity"].as_array() {
        println!("Recent Activity:");
        for entry in entries {
            println!(
                "  {}  p={}  {} ms{}",
                entry["timestamp"].as_str().unwrap_or("?"),
                entry["probability"],
                entry["processingTimeMs"],
                if entry["hasComments"].as_bool().unwrap_or(false) {
                    "  [commented]"
                } else {
                    ""
                },
            );
        }
    }

    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let url = format!("{}/health", server);
    let resp = client()?.get(&url).send();

    match resp {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Lumen server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:      {}", body["version"].as_str().unwrap_or("?"));
            println!("PostgreSQL:   {}", body["postgresql"].as_str().unwrap_or("?"));
            println!("Classifier:   {}", body["classifier"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("lumen-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("lumen-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::List { json } => do_list(&server, json),
        Commands::Summary { window, json } => do_summary(&server, &window, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("lumen-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
