//! # Export / Import Commands
//!
//! Moves data between stores (or into a backup) as versioned JSON files.
//!
//! ```text
//! tally export products --out products.json
//!        │
//!        ▼
//! { "version": "1.0", "dataType": "products", "exportedAt": ..., "data": [...] }
//!        │
//!        ▼
//! tally import products.json --policy keep-existing
//!        │
//!        ▼
//! Imported 12, updated 3, skipped 0, errors 1
//! ```

use chrono::{NaiveDate, Utc};
use clap::Args;
use std::path::PathBuf;
use tally_core::analytics::ReportPeriod;
use tally_core::transfer::{ConflictPolicy, DataType, ImportSummary};
use tracing::{info, warn};

use crate::error::ApiError;
use crate::state::AppState;

#[derive(Debug, Args)]
pub struct ExportArgs {
    /// products, categories, suppliers, customers, sales or all
    pub data_type: DataType,

    /// Output file; stdout when omitted
    #[arg(long, short)]
    pub out: Option<PathBuf>,

    /// First day of a sales export (YYYY-MM-DD)
    #[arg(long, requires = "to")]
    pub from: Option<NaiveDate>,

    /// Last day of a sales export, inclusive
    #[arg(long, requires = "from")]
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    pub file: PathBuf,

    /// What to do with records that already exist: overwrite or keep-existing
    #[arg(long, default_value = "overwrite")]
    pub policy: ConflictPolicy,
}

pub async fn export(state: &AppState, args: ExportArgs) -> Result<String, ApiError> {
    let service = state.db.transfer();

    let days = args.from.zip(args.to);
    let json = match (days, args.data_type) {
        (Some((from, to)), DataType::Sales) => {
            let range = ReportPeriod::Custom { from, to }.range(Utc::now());
            service.export_sales_between(range.from, range.to).await?
        }
        (Some(_), other) => {
            return Err(ApiError::validation(format!(
                "--from/--to only apply to sales exports, not {}",
                other
            )))
        }
        (None, data_type) => service.export(data_type).await?,
    };

    match args.out {
        Some(path) => {
            std::fs::write(&path, &json)?;
            info!(path = %path.display(), data_type = %args.data_type, "Export written");
            Ok(format!("Exported {} to {}", args.data_type, path.display()))
        }
        None => Ok(json),
    }
}

pub async fn import(state: &AppState, args: ImportArgs) -> Result<String, ApiError> {
    let json = std::fs::read_to_string(&args.file)
        .map_err(|e| ApiError::io(format!("Cannot read {}: {}", args.file.display(), e)))?;

    let summary = state.db.transfer().import(&json, args.policy).await?;
    if summary.errors > 0 {
        warn!(errors = summary.errors, file = %args.file.display(), "Import finished with errors");
    }

    state.render(&summary, summary_text)
}

fn summary_text(summary: &ImportSummary) -> String {
    let mut out = format!(
        "Imported {}, updated {}, skipped {}, errors {}",
        summary.imported, summary.updated, summary.skipped, summary.errors
    );
    for message in &summary.messages {
        out.push_str("\n  ");
        out.push_str(message);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::party::{run_category, CategoryCommand};
    use crate::commands::product::{run as run_product, NewProduct, ProductCommand};
    use crate::commands::testing::state;
    use crate::error::ErrorCode;

    async fn catalog(state: &AppState) {
        run_category(
            state,
            CategoryCommand::Add {
                name: "Drinks".to_string(),
                description: None,
            },
        )
        .await
        .unwrap();
        run_product(
            state,
            ProductCommand::Add(NewProduct {
                name: "Cola".to_string(),
                barcode: Some("5449000000996".to_string()),
                price: "1.50".to_string(),
                cost: None,
                quantity: 10,
                min_stock: 0,
                category: Some("Drinks".to_string()),
                supplier: None,
                tiers: Some("6@135".to_string()),
                description: None,
            }),
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_export_file_into_fresh_store() {
        let source = state().await;
        catalog(&source).await;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("all.json");
        export(
            &source,
            ExportArgs {
                data_type: DataType::All,
                out: Some(path.clone()),
                from: None,
                to: None,
            },
        )
        .await
        .unwrap();

        let target = state().await;
        let out = import(
            &target,
            ImportArgs {
                file: path.clone(),
                policy: ConflictPolicy::Overwrite,
            },
        )
        .await
        .unwrap();
        assert!(out.starts_with("Imported 2, updated 0"));

        let cola = crate::commands::find_product(&target, "5449000000996")
            .await
            .unwrap();
        assert_eq!(cola.quantity, 10);
        assert_eq!(cola.bulk_pricing.len(), 1);
        let drinks = target.db.categories().lookup("Drinks").await.unwrap().unwrap();
        assert_eq!(cola.category_id, Some(drinks.id));

        // second run matches everything
        let again = import(
            &target,
            ImportArgs {
                file: path,
                policy: ConflictPolicy::KeepExisting,
            },
        )
        .await
        .unwrap();
        assert!(again.starts_with("Imported 0, updated 0, skipped 2"));
    }

    #[tokio::test]
    async fn test_sales_file_cannot_be_imported() {
        let state = state().await;
        let json = export(
            &state,
            ExportArgs {
                data_type: DataType::Sales,
                out: None,
                from: None,
                to: None,
            },
        )
        .await
        .unwrap();

        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, json.as_bytes()).unwrap();

        let err = import(
            &state,
            ImportArgs {
                file: file.path().to_path_buf(),
                policy: ConflictPolicy::Overwrite,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::TransferError);
    }

    #[tokio::test]
    async fn test_missing_file() {
        let state = state().await;
        let err = import(
            &state,
            ImportArgs {
                file: PathBuf::from("/nonexistent/tally-import.json"),
                policy: ConflictPolicy::Overwrite,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.code, ErrorCode::Io);
    }
}
