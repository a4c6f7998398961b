//! Command handlers. Each one talks to the service only through
//! [`ApiClient`], so every resource call shares the same session pipeline.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use clap::Subcommand;
use healthtrack_core::{Activity, ActivityApi, ActivityKind, ApiClient, Config};
use tracing::warn;

use crate::entry::{Editable, EntryFields};
use crate::format::{humanize, render_choices, render_table, Row};

#[derive(Subcommand)]
pub enum Command {
    /// Log in and persist the session
    Login {
        /// Account email; defaults to the last one used
        #[arg(long)]
        email: Option<String>,
    },

    /// Create an account (does not log in)
    Register {
        #[arg(long)]
        full_name: String,
        #[arg(long)]
        email: String,
    },

    /// End the session and forget stored credentials
    Logout,

    /// Show who is logged in
    Whoami,

    /// List entries of one kind
    List {
        /// workouts, meals or steps
        kind: ActivityKind,
    },

    /// Show one entry
    Show { kind: ActivityKind, id: i64 },

    /// Log a new entry, starting from the server's defaults
    Add {
        kind: ActivityKind,
        #[command(flatten)]
        fields: EntryFields,
    },

    /// Change fields of a saved entry
    Edit {
        kind: ActivityKind,
        id: i64,
        #[command(flatten)]
        fields: EntryFields,
    },

    /// Flip an entry between done and not done
    Toggle { kind: ActivityKind, id: i64 },

    /// Delete an entry
    Delete { kind: ActivityKind, id: i64 },

    /// Show the type and status options for every kind
    Choices,
}

pub async fn run(command: Command, client: &ApiClient, config: &Config, json: bool) -> Result<()> {
    match command {
        Command::Login { email } => login(client, config, email).await,
        Command::Register { full_name, email } => register(client, &full_name, &email).await,
        Command::Logout => {
            client.logout().await;
            Ok(())
        }
        Command::Whoami => whoami(client),
        Command::List { kind } => match kind {
            ActivityKind::Workout => list(client.workouts(), json).await,
            ActivityKind::Meal => list(client.meals(), json).await,
            ActivityKind::Steps => list(client.steps(), json).await,
        },
        Command::Show { kind, id } => match kind {
            ActivityKind::Workout => show(client.workouts(), id, json).await,
            ActivityKind::Meal => show(client.meals(), id, json).await,
            ActivityKind::Steps => show(client.steps(), id, json).await,
        },
        Command::Add { kind, fields } => match kind {
            ActivityKind::Workout => add(client.workouts(), &fields, json).await,
            ActivityKind::Meal => add(client.meals(), &fields, json).await,
            ActivityKind::Steps => add(client.steps(), &fields, json).await,
        },
        Command::Edit { kind, id, fields } => match kind {
            ActivityKind::Workout => edit(client.workouts(), id, &fields, json).await,
            ActivityKind::Meal => edit(client.meals(), id, &fields, json).await,
            ActivityKind::Steps => edit(client.steps(), id, &fields, json).await,
        },
        Command::Toggle { kind, id } => match kind {
            ActivityKind::Workout => toggle(client.workouts(), id).await,
            ActivityKind::Meal => toggle(client.meals(), id).await,
            ActivityKind::Steps => toggle(client.steps(), id).await,
        },
        Command::Delete { kind, id } => {
            match kind {
                ActivityKind::Workout => client.workouts().delete(id).await?,
                ActivityKind::Meal => client.meals().delete(id).await?,
                ActivityKind::Steps => client.steps().delete(id).await?,
            }
            println!("Deleted {} {}", kind, id);
            Ok(())
        }
        Command::Choices => choices(client, json).await,
    }
}

async fn login(client: &ApiClient, config: &Config, email: Option<String>) -> Result<()> {
    let email = match email {
        Some(email) => email,
        None => prompt_email(config.last_email.as_deref())?,
    };
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;

    let session = client.login(&email, &password).await?;

    if let Err(e) = Config::remember_last_email(&email) {
        warn!(error = %e, "Failed to remember last email");
    }

    println!(
        "Logged in as {} <{}>",
        session.identity.display_name, session.identity.email
    );
    Ok(())
}

fn prompt_email(last: Option<&str>) -> Result<String> {
    match last {
        Some(last) => print!("Email [{}]: ", last),
        None => print!("Email: "),
    }
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let entered = line.trim();

    match (entered.is_empty(), last) {
        (false, _) => Ok(entered.to_string()),
        (true, Some(last)) => Ok(last.to_string()),
        (true, None) => anyhow::bail!("An email address is required"),
    }
}

async fn register(client: &ApiClient, full_name: &str, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ").context("Failed to read password")?;
    client.register(full_name, email, &password).await?;
    println!("Account created for {}. Run `healthtrack login` to continue.", email);
    Ok(())
}

fn whoami(client: &ApiClient) -> Result<()> {
    match client.current_session() {
        Some(session) => println!(
            "{} <{}>",
            session.identity.display_name, session.identity.email
        ),
        None => println!("Not logged in"),
    }
    Ok(())
}

async fn list<T: Activity + Row>(api: ActivityApi<T>, json: bool) -> Result<()> {
    let entries = api.list().await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        println!("No {} entries yet", T::KIND);
    } else {
        print!("{}", render_table(&entries));
    }
    Ok(())
}

async fn show<T: Activity + Row>(api: ActivityApi<T>, id: i64, json: bool) -> Result<()> {
    let entry = api.get(id).await?;
    print_entry(&entry, json)
}

fn print_entry<T: Activity + Row>(entry: &T, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(entry)?);
    } else {
        print!("{}", render_table(std::slice::from_ref(entry)));
    }
    Ok(())
}

async fn add<T: Editable + Row>(api: ActivityApi<T>, fields: &EntryFields, json: bool) -> Result<()> {
    let mut entry = api.draft().await;
    entry.apply(fields)?;

    let created = api.create(&entry).await?;
    eprintln!("{} logged", humanize(T::KIND.label()));
    print_entry(&created, json)
}

async fn edit<T: Editable + Row>(
    api: ActivityApi<T>,
    id: i64,
    fields: &EntryFields,
    json: bool,
) -> Result<()> {
    let mut entry = api.get(id).await?;
    entry.apply(fields)?;

    let updated = api.update(id, &entry).await?;
    eprintln!("{} {} updated", humanize(T::KIND.label()), id);
    print_entry(&updated, json)
}

async fn toggle<T: Activity>(api: ActivityApi<T>, id: i64) -> Result<()> {
    let entry = api.get(id).await?;
    let updated = api.toggle_status(&entry).await?;
    println!("{} {} is now {}", T::KIND, id, humanize(updated.status()).to_lowercase());
    Ok(())
}

/// Fetch the option lists for every kind at once.
async fn choices(client: &ApiClient, json: bool) -> Result<()> {
    let (workout_api, meal_api, steps_api) = (client.workouts(), client.meals(), client.steps());
    let (workouts, meals, steps) = futures::join!(
        workout_api.choices(),
        meal_api.choices(),
        steps_api.choices(),
    );
    let all = [
        (ActivityKind::Workout, workouts?),
        (ActivityKind::Meal, meals?),
        (ActivityKind::Steps, steps?),
    ];

    if json {
        let map: serde_json::Map<String, serde_json::Value> = all
            .iter()
            .map(|(kind, choices)| Ok((kind.label().to_string(), serde_json::to_value(choices)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&map)?);
    } else {
        for (kind, choices) in &all {
            print!("{}", render_choices(kind.label(), choices));
        }
    }
    Ok(())
}
