use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use shared::{
    domain::{Item, UserId},
    expiry::select_expired,
};
use storage::Storage;

#[derive(Parser, Debug)]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/warehouse.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Creates the user if missing and prints its id.
    CreateUser {
        username: String,
    },
    AddItem {
        user_id: i64,
        name: String,
        amount: i64,
        exp_date: String,
        #[arg(value_name = "BOX")]
        box_label: String,
    },
    ListItems {
        user_id: i64,
    },
    /// Items whose expiration date is before `--today`.
    Expired {
        user_id: i64,
        #[arg(long)]
        today: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url)
        .await
        .with_context(|| format!("failed to open {}", cli.database_url))?;

    match cli.command {
        Command::CreateUser { username } => {
            let user_id = storage.create_user(&username).await?;
            println!("user_id={}", user_id.0);
        }
        Command::AddItem {
            user_id,
            name,
            amount,
            exp_date,
            box_label,
        } => {
            let item = storage
                .insert_item(
                    UserId(user_id),
                    &Item::draft(name, amount, exp_date, box_label),
                )
                .await?;
            print_item(&item);
        }
        Command::ListItems { user_id } => {
            for item in storage.list_items_for_user(UserId(user_id)).await? {
                print_item(&item);
            }
            let count = storage.count_items_for_user(UserId(user_id)).await?;
            println!("{count} item(s) for user {user_id}");
        }
        Command::Expired { user_id, today } => {
            let today = today.unwrap_or_else(|| Local::now().date_naive());
            let items = storage.list_items_for_user(UserId(user_id)).await?;
            let selection = select_expired(&items, today);
            for item in &selection.expired {
                print_item(item);
            }
            println!(
                "{} of {} item(s) expired before {today}; {} with unreadable dates",
                selection.expired.len(),
                items.len(),
                selection.unparseable
            );
        }
    }

    Ok(())
}

fn print_item(item: &Item) {
    println!(
        "{}\t{}\t{}\t{}\t{}",
        item.id.as_ref().map(|id| id.as_str()).unwrap_or("-"),
        item.name,
        item.amount,
        item.exp_date,
        item.box_label
    );
}
