//! Bulk operations CLI - batch jobs and exports against the Shopify Admin API.
//!
//! # Usage
//!
//! ```bash
//! # Register translations for every locale of a job file
//! bulkops translate --job jobs/products.yaml
//!
//! # Export product translatable content
//! bulkops fetch translatable --resource-type PRODUCT --keys title,body_html \
//!     --out data/product-translatable-resources.json
//!
//! # Move each product's video to the second gallery slot
//! bulkops fetch media --out data/product-media.json
//! bulkops products reorder-videos --input data/product-media.json \
//!     --progress output/reorder.json
//!
//! # Delete marketplace customers, resuming after the first 500
//! bulkops delete customers --input data/filtered-customers.json \
//!     --progress output/customers.json --skip 500
//!
//! # Locale completion report
//! bulkops progress --input-dir input --output-dir output
//! ```
//!
//! # Environment Variables
//!
//! - `SHOPIFY_SHOP` - Store domain (`example.myshopify.com`)
//! - `SHOPIFY_ACCESS_TOKEN` - Static Admin API token, or
//! - `SESSION_DATABASE_URL`, `SHOPIFY_API_KEY`, `SHOPIFY_API_SECRET` - offline
//!   session store and OAuth client used to refresh it
//! - `BULKOPS_THROTTLE_KEYWORDS`, `BULKOPS_TRANSIENT_KEYWORDS` - Extra
//!   comma-separated error substrings to retry
//! - `RUST_LOG` - Log filter (default `bulkops=info`)
//! - `BULKOPS_LOG_JSON` - Emit JSON log lines when set

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

use commands::{FetchArgs, RunArgs};

#[derive(Parser)]
#[command(name = "bulkops")]
#[command(author, version, about = "Shopify Admin API bulk operations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Register translations from a job file
    Translate {
        /// YAML job file
        #[arg(short, long)]
        job: PathBuf,

        /// Run only this locale instead of every locale in the job
        #[arg(short, long)]
        locale: Option<String>,

        /// Plan without sending mutations or writing the ledger
        #[arg(long)]
        dry_run: bool,

        /// Items per batch (overrides the job file)
        #[arg(long)]
        concurrency: Option<usize>,
    },
    /// Add tags to resources
    Tag {
        #[command(subcommand)]
        target: TagTarget,
    },
    /// Rewrite product handles
    Handles {
        #[command(subcommand)]
        action: HandlesAction,
    },
    /// Product SEO, feature list and video jobs
    Products {
        #[command(subcommand)]
        action: ProductsAction,
    },
    /// Collection jobs
    Collections {
        #[command(subcommand)]
        action: CollectionsAction,
    },
    /// Delete resources listed in an export
    Delete {
        #[command(subcommand)]
        target: DeleteTargetArg,
    },
    /// Paginated exports
    Fetch {
        #[command(subcommand)]
        target: FetchTarget,
    },
    /// Offline reports
    Report {
        #[command(subcommand)]
        report: ReportKind,
    },
    /// Translation completion per locale
    Progress {
        /// Directory of `<locale>.csv` input files
        #[arg(long)]
        input_dir: PathBuf,

        /// Directory holding `<locale>/translated.json` ledgers
        #[arg(long)]
        output_dir: PathBuf,
    },
}

#[derive(Subcommand)]
enum TagTarget {
    /// Tag the products whose SKU is listed in a CSV file
    Products {
        /// CSV listing the products
        #[arg(long)]
        csv: PathBuf,

        /// Column holding the SKU
        #[arg(long, default_value = "SKU")]
        sku_column: String,

        /// `fetch products` export
        #[arg(long)]
        skus: PathBuf,

        /// Tags to add
        #[arg(long, value_delimiter = ',', required = true)]
        tags: Vec<String>,

        /// Ledger file
        #[arg(long)]
        progress: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Subcommand)]
enum HandlesAction {
    /// Set handles from a `[{id, handle}]` export, redirecting the old ones
    Override {
        #[arg(long)]
        input: PathBuf,

        /// Ledger file
        #[arg(long)]
        progress: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },
}

/// Input export and ledger of a job that reads one file.
#[derive(clap::Args)]
struct JobFiles {
    #[arg(long)]
    input: PathBuf,

    /// Ledger file
    #[arg(long)]
    progress: PathBuf,
}

#[derive(Subcommand)]
enum ProductsAction {
    /// Set SEO titles and descriptions from a `[{GID, metatitle, metadescription}]` export
    Seo {
        #[command(flatten)]
        files: JobFiles,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Set the feature list metafield from a `[{GID, short_description}]` export
    Features {
        #[command(flatten)]
        files: JobFiles,

        /// Metafield namespace
        #[arg(long, default_value = "custom")]
        namespace: String,

        /// Metafield key
        #[arg(long, default_value = "feature_list")]
        key: String,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Attach external videos from a `{productId: url}` file
    AddVideos {
        #[command(flatten)]
        files: JobFiles,

        #[command(flatten)]
        run: RunArgs,
    },
    /// Move each product's first external video to a gallery position,
    /// reading a `fetch media` export
    ReorderVideos {
        #[command(flatten)]
        files: JobFiles,

        /// 0-based target position
        #[arg(long, default_value_t = 1)]
        position: usize,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Subcommand)]
enum CollectionsAction {
    /// Reset titles, handles and descriptions from a `[{id, title, handle, description}]` export
    Override {
        #[command(flatten)]
        files: JobFiles,

        #[command(flatten)]
        run: RunArgs,
    },
}

#[derive(Subcommand)]
enum DeleteTargetArg {
    /// Delete the customers in a `fetch customers` export
    Customers(DeleteArgs),
    /// Delete the orders in a `fetch orders` export
    Orders(DeleteArgs),
}

#[derive(clap::Args)]
struct DeleteArgs {
    #[arg(long)]
    input: PathBuf,

    /// Ledger file
    #[arg(long)]
    progress: PathBuf,

    /// Ignore the first N entries of the export
    #[arg(long, default_value_t = 0)]
    skip: usize,

    #[command(flatten)]
    run: RunArgs,
}

#[derive(Subcommand)]
enum FetchTarget {
    /// Translatable resources with their content digests
    Translatable {
        /// `TranslatableResourceType` (PRODUCT, COLLECTION, ARTICLE, ...)
        #[arg(long, default_value = "PRODUCT")]
        resource_type: String,

        /// Content keys to keep (all when omitted)
        #[arg(long, value_delimiter = ',')]
        keys: Vec<String>,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Customers whose email domain matches the blocklist
    Customers {
        /// Domain fragments (defaults to the marketplace list)
        #[arg(long, value_delimiter = ',')]
        domains: Vec<String>,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Orders whose email domain matches the blocklist
    Orders {
        /// Domain fragments (defaults to the marketplace list)
        #[arg(long, value_delimiter = ',')]
        domains: Vec<String>,

        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Product IDs with their first variant SKU
    Products {
        #[command(flatten)]
        fetch: FetchArgs,
    },
    /// Product IDs with their media in gallery order
    Media {
        #[command(flatten)]
        fetch: FetchArgs,
    },
}

#[derive(Subcommand)]
enum ReportKind {
    /// Count customers per email domain
    Domains {
        /// `fetch customers` export
        #[arg(long)]
        input: PathBuf,

        /// CSV to write
        #[arg(long)]
        out: PathBuf,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bulkops=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if std::env::var_os("BULKOPS_LOG_JSON").is_some() {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() {
    // .env may carry RUST_LOG as well as the Shopify settings
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Translate {
            job,
            locale,
            dry_run,
            concurrency,
        } => {
            commands::translate::run(&job, locale.as_deref(), dry_run, concurrency).await?;
        }
        Commands::Tag {
            target:
                TagTarget::Products {
                    csv,
                    sku_column,
                    skus,
                    tags,
                    progress,
                    run,
                },
        } => commands::tag::products(csv, sku_column, skus, tags, progress, &run).await?,
        Commands::Handles {
            action: HandlesAction::Override { input, progress, run },
        } => commands::handles::override_handles(input, progress, &run).await?,
        Commands::Products { action } => match action {
            ProductsAction::Seo { files, run } => {
                commands::products::seo(files.input, files.progress, &run).await?;
            }
            ProductsAction::Features {
                files,
                namespace,
                key,
                run,
            } => {
                let mutation = bulkops_admin::jobs::FeatureListSet { namespace, key };
                commands::products::features(files.input, files.progress, mutation, &run).await?;
            }
            ProductsAction::AddVideos { files, run } => {
                commands::products::add_videos(files.input, files.progress, &run).await?;
            }
            ProductsAction::ReorderVideos {
                files,
                position,
                run,
            } => commands::products::reorder_videos(files.input, files.progress, position, &run).await?,
        },
        Commands::Collections {
            action: CollectionsAction::Override { files, run },
        } => commands::collections::override_collections(files.input, files.progress, &run).await?,
        Commands::Delete { target } => {
            let (target, args) = match target {
                DeleteTargetArg::Customers(args) => (bulkops_admin::jobs::DeleteTarget::Customer, args),
                DeleteTargetArg::Orders(args) => (bulkops_admin::jobs::DeleteTarget::Order, args),
            };
            commands::delete::run(target, args.input, args.progress, args.skip, &args.run).await?;
        }
        Commands::Fetch { target } => match target {
            FetchTarget::Translatable {
                resource_type,
                keys,
                fetch,
            } => commands::fetch::translatable(&resource_type, &keys, &fetch).await?,
            FetchTarget::Customers { domains, fetch } => {
                commands::fetch::customers(&domains, &fetch).await?;
            }
            FetchTarget::Orders { domains, fetch } => commands::fetch::orders(&domains, &fetch).await?,
            FetchTarget::Products { fetch } => commands::fetch::products(&fetch).await?,
            FetchTarget::Media { fetch } => commands::fetch::media(&fetch).await?,
        },
        Commands::Report {
            report: ReportKind::Domains { input, out },
        } => commands::report::domains(&input, &out)?,
        Commands::Progress {
            input_dir,
            output_dir,
        } => commands::report::progress(&input_dir, &output_dir)?,
    }
    Ok(())
}
