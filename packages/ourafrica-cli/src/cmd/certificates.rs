//! Certificate commands

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use console::style;
use ourafrica_client::{Certificate, CertificateQuery, OurAfricaClient};

#[derive(Subcommand)]
pub enum CertificateCommands {
    /// List your certificates
    List {
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        limit: Option<u32>,
        /// Filter by course title
        #[arg(long)]
        search: Option<String>,
    },

    /// Show one certificate
    Show { id: String },

    /// Save the certificate document to disk
    Download {
        id: String,
        /// Output file (defaults to certificate-<id>.pdf)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Claim the certificate for a completed course
    Claim { course_id: String },
}

pub async fn run(client: &OurAfricaClient, command: CertificateCommands) -> Result<()> {
    match command {
        CertificateCommands::List {
            page,
            limit,
            search,
        } => {
            let query = CertificateQuery {
                page,
                limit,
                search,
            };
            list(client, &query).await
        }
        CertificateCommands::Show { id } => {
            let certificate = client.student().get_certificate(&id).await?;
            print_certificate(&certificate);
            Ok(())
        }
        CertificateCommands::Download { id, output } => download(client, &id, output).await,
        CertificateCommands::Claim { course_id } => {
            let certificate = client.student().claim_certificate(&course_id).await?;
            println!("{} Certificate issued", "✓".green().bold());
            print_certificate(&certificate);
            Ok(())
        }
    }
}

async fn list(client: &OurAfricaClient, query: &CertificateQuery) -> Result<()> {
    let page = client.student().list_certificates(query).await?;

    if page.items.is_empty() {
        println!("  {}", style("No certificates yet").dim());
        return Ok(());
    }

    println!("{}", style("Certificates:").cyan().bold());
    println!("{}", style("─".repeat(72)).dim());
    for certificate in &page.items {
        println!(
            "  {:<12} {:<40} {}",
            style(&certificate.id).dim(),
            style(certificate.title()).cyan(),
            certificate
                .issued_at
                .map(|at| at.format("%Y-%m-%d").to_string())
                .unwrap_or_default()
        );
    }
    if let Some(total) = page.total {
        println!();
        println!("  {} of {} shown", page.items.len(), total);
    }
    Ok(())
}

async fn download(client: &OurAfricaClient, id: &str, output: Option<PathBuf>) -> Result<()> {
    let bytes = client.student().download_certificate(id).await?;

    let path = output.unwrap_or_else(|| PathBuf::from(format!("certificate-{}.pdf", id)));
    tokio::fs::write(&path, &bytes)
        .await
        .with_context(|| format!("write {}", path.display()))?;

    println!(
        "{} Saved {} ({} bytes)",
        "✓".green().bold(),
        path.display(),
        bytes.len()
    );
    Ok(())
}

fn print_certificate(certificate: &Certificate) {
    println!("{}", certificate.title().bold());
    println!("  {:<14} {}", "ID:", certificate.id);
    println!("  {:<14} {}", "Course:", certificate.course_id);
    if let Some(number) = &certificate.certificate_number {
        println!("  {:<14} {}", "Number:", number);
    }
    if let Some(issued) = certificate.issued_at {
        println!("  {:<14} {}", "Issued:", issued.format("%Y-%m-%d"));
    }
    if let Some(score) = certificate.final_score {
        println!("  {:<14} {:.1}%", "Score:", score);
    }
    if let Some(code) = &certificate.verification_code {
        println!("  {:<14} {}", "Verification:", style(code).dim());
    }
}
