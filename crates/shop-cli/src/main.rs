use anyhow::Result;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

use commands::{order, product};

#[derive(Parser)]
#[command(name = "shop")]
#[command(about = "Storefront order service CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> env -> local)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Product seeding and restocking
    Product {
        #[command(subcommand)]
        cmd: ProductCmd,
    },

    /// Order placement and administration
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum ProductCmd {
    /// Insert a product and print its id
    Add {
        #[arg(long)]
        name: String,

        /// Unit price, e.g. 10.00
        #[arg(long)]
        price: Decimal,

        #[arg(long, default_value_t = 0)]
        stock: i32,
    },

    /// Print one product row
    Show {
        #[arg(long)]
        id: i64,
    },

    /// Add stock to a product (waits for in-flight checkouts on that row)
    Restock {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        qty: i32,
    },
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Place an order atomically: all items or nothing
    Place {
        /// Buyer user id
        #[arg(long)]
        user: i64,

        /// Cart line as <product_id>:<quantity>; repeat for more lines
        #[arg(long = "item", required = true)]
        items: Vec<String>,
    },

    /// Print one order with its items
    Show {
        #[arg(long)]
        id: i64,
    },

    /// List orders, newest first
    List {
        /// Only this user's orders
        #[arg(long)]
        user: Option<i64>,

        #[arg(long, default_value_t = false)]
        include_items: bool,
    },

    /// Set an order's status (pending | paid)
    SetStatus {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        status: String,
    },

    /// Delete an order and its items (stock is not returned)
    Delete {
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience).
    let _ = dotenvy::from_filename(".env.local");

    // Logs go to stderr so stdout stays key=value.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Commands::ConfigHash { paths } = &cli.cmd {
        let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
        let loaded = shop_config::load_layered_yaml(&path_refs)?;
        println!("config_hash={}", loaded.config_hash);
        println!("{}", loaded.canonical_json);
        return Ok(());
    }

    let settings = commands::load_settings(&cli.config_paths)?;

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = commands::connect(&settings).await?;
            match cmd {
                DbCmd::Status => {
                    let s = shop_db::status(&pool).await?;
                    println!("db_ok={} has_orders_table={}", s.ok, s.has_orders_table);
                }
                DbCmd::Migrate => {
                    shop_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { .. } => {}

        Commands::Product { cmd } => match cmd {
            ProductCmd::Add { name, price, stock } => {
                product::product_add(&settings, name, price, stock).await?
            }
            ProductCmd::Show { id } => product::product_show(&settings, id).await?,
            ProductCmd::Restock { id, qty } => product::product_restock(&settings, id, qty).await?,
        },

        Commands::Order { cmd } => match cmd {
            OrderCmd::Place { user, items } => order::order_place(&settings, user, &items).await?,
            OrderCmd::Show { id } => order::order_show(&settings, id).await?,
            OrderCmd::List {
                user,
                include_items,
            } => order::order_list(&settings, user, include_items).await?,
            OrderCmd::SetStatus { id, status } => {
                order::order_set_status(&settings, id, &status).await?
            }
            OrderCmd::Delete { id } => order::order_delete(&settings, id).await?,
        },
    }

    Ok(())
}
