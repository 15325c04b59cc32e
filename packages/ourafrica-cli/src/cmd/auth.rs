//! Session commands: login, logout, whoami, status, refresh

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::{theme::ColorfulTheme, Input, Password};
use ourafrica_client::token;
use ourafrica_client::{Credentials, CurrentUser, OurAfricaClient};

pub async fn login(client: &OurAfricaClient, email: Option<String>) -> Result<()> {
    let theme = ColorfulTheme::default();

    let email = match email {
        Some(email) => email,
        None => Input::<String>::with_theme(&theme)
            .with_prompt("Email")
            .interact_text()
            .context("Failed to read email")?,
    };
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .interact()
        .context("Failed to read password")?;

    let user = client.auth().login(Credentials::new(email, password)).await?;

    println!(
        "{} Signed in as {} ({})",
        "✓".green().bold(),
        user.display_name().bold(),
        user.role
    );
    if client.auth().is_offline_session() {
        println!(
            "{}",
            "Offline sign-in: using cached credentials until you reconnect.".yellow()
        );
    }
    Ok(())
}

pub async fn logout(client: &OurAfricaClient) -> Result<()> {
    let was_signed_in = client.auth().is_authenticated();
    // Also clears leftover expired tokens.
    client.auth().logout().await;

    println!("{}", logout_message(was_signed_in));
    Ok(())
}

fn logout_message(was_signed_in: bool) -> String {
    if was_signed_in {
        format!("{} Signed out", "✓".green().bold())
    } else {
        "Not signed in.".dimmed().to_string()
    }
}

pub async fn whoami(client: &OurAfricaClient) -> Result<()> {
    if !client.auth().is_authenticated() {
        println!("{}", "Not signed in.".dimmed());
        return Ok(());
    }

    let user = match client.auth().fetch_current_user().await {
        Ok(user) => user,
        Err(err) if !err.is_unauthorized() => {
            tracing::warn!(error = %err, "Could not refresh profile, showing cached record");
            client
                .user()
                .current()
                .context("No cached user record available")?
        }
        Err(err) => return Err(err.into()),
    };

    print_user(&user);
    Ok(())
}

pub fn status(client: &OurAfricaClient) -> Result<()> {
    let session = client.auth().session();

    let state = if session.is_authenticated {
        "signed in".green()
    } else {
        "signed out".red()
    };
    println!("{:<16} {}", "Session:", state);
    if client.auth().is_offline_session() {
        println!("{:<16} {}", "Mode:", "offline".yellow());
    }
    if let Some(name) = client.user().display_name() {
        println!("{:<16} {}", "User:", name);
    }
    println!("{:<16} {}", "Access token:", describe_token(session.access_token.as_deref()));
    println!("{:<16} {}", "Refresh token:", describe_token(session.refresh_token.as_deref()));
    Ok(())
}

pub async fn refresh(client: &OurAfricaClient) -> Result<()> {
    client.auth().refresh_tokens().await?;

    let access = client.auth().session().access_token;
    println!(
        "{} Access token renewed, {}",
        "✓".green().bold(),
        describe_token(access.as_deref())
    );
    Ok(())
}

fn print_user(user: &CurrentUser) {
    println!("{}", user.display_name().bold());
    println!("  {:<10} {}", "Email:", user.email);
    println!("  {:<10} {}", "Role:", user.role);
    println!("  {:<10} {}", "ID:", user.id.dimmed());
    if let Some(phone) = &user.phone_number {
        println!("  {:<10} {}", "Phone:", phone);
    }
    if !user.email_verified {
        println!("  {}", "Email not verified".yellow());
    }
}

fn describe_token(token: Option<&str>) -> String {
    let Some(token) = token else {
        return "none".dimmed().to_string();
    };

    match token::seconds_until_expiry(token) {
        Some(secs) if secs > 0 => format!("expires in {}", humanize(secs)),
        Some(secs) => format!("expired {} ago", humanize(-secs)).red().to_string(),
        None => "opaque".to_string(),
    }
}

fn humanize(secs: i64) -> String {
    match secs {
        s if s < 60 => format!("{}s", s),
        s if s < 3600 => format!("{}m", s / 60),
        s if s < 86_400 => format!("{}h {}m", s / 3600, (s % 3600) / 60),
        s => format!("{}d", s / 86_400),
    }
}
