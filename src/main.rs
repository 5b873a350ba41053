use chrono::Local;
use clap::Parser;
use small_inventory::config::cli::{BackupCommand, Command, RecordArgs, ReportArgs};
use small_inventory::core::backup::{BackupInfo, BackupService};
use small_inventory::core::diagnostics::Diagnostics;
use small_inventory::core::entries::{Entry, FormFields, Recorder};
use small_inventory::core::ledger::{DateRange, Ledger};
use small_inventory::core::sheets::{parse_inventory, template_workbook};
use small_inventory::core::workbook::Workbook;
use small_inventory::domain::model::ProductCatalog;
use small_inventory::domain::ports::Storage;
use small_inventory::domain::report::{ReportFormat, ReportKind};
use small_inventory::utils::validation::Validate;
use small_inventory::utils::{format, logger};
use small_inventory::{
    server, AppConfig, Cli, InventoryError, LocalStorage, ReportEngine, ReportPipeline,
    ReportRequest,
};
use std::collections::HashMap;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match AppConfig::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Failed to load config file '{}': {}", cli.config.display(), e);
            eprintln!("💡 Make sure the file exists and is valid TOML format");
            std::process::exit(e.exit_code().max(1));
        }
    };
    if config.logging.directory.is_none() {
        config.logging.directory = Some(config.paths.logs_dir.clone());
    }

    // check 與 template 自行回報設定問題
    let validates = !matches!(cli.command, Command::Check | Command::Template { .. });
    if validates {
        if let Err(e) = config.validate() {
            eprintln!("❌ Configuration validation failed: {}", e);
            eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
            std::process::exit(e.exit_code().max(1));
        }
    }

    // 日誌 guard 需活到程式結束
    let _guard = match logger::init_cli_logger(cli.verbose, &config.logging) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Failed to initialise logging: {}", e);
            std::process::exit(e.exit_code().max(1));
        }
    };

    tracing::debug!("CLI args: {:?}", cli);
    if cli.monitor {
        tracing::info!("🔍 System monitoring enabled");
    }

    if let Err(error) = run(cli, config).await {
        match error.downcast_ref::<InventoryError>() {
            Some(e) => {
                tracing::error!(
                    "❌ Command failed: {} (Category: {:?}, Severity: {:?})",
                    e,
                    e.category(),
                    e.severity()
                );
                tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                eprintln!("❌ {}", e.user_friendly_message());
                eprintln!("💡 建議: {}", e.recovery_suggestion());
                let code = e.exit_code();
                if code > 0 {
                    std::process::exit(code);
                }
            }
            None => {
                tracing::error!("❌ {:#}", error);
                eprintln!("❌ {:#}", error);
                std::process::exit(1);
            }
        }
    }
}

async fn run(cli: Cli, mut config: AppConfig) -> anyhow::Result<()> {
    let storage = LocalStorage::default();
    match cli.command {
        Command::Check => check(&config).await,
        Command::Summary => summary(&storage, &config).await,
        Command::Report(args) => report(storage, config, args, cli.monitor).await,
        Command::Record(args) => record(&storage, &config, args).await,
        Command::Backup(command) => backup(&config, command).await,
        Command::Template { output, force } => {
            let path = output.unwrap_or_else(|| config.paths.workbook.clone());
            let path = path.to_string_lossy().to_string();
            if storage.exists(&path).await && !force {
                anyhow::bail!("{} already exists, pass --force to overwrite", path);
            }
            let catalog = ProductCatalog::from_config(&config);
            let data = template_workbook(&config, &catalog).to_xlsx()?;
            storage.write_file(&path, &data).await?;
            println!("✅ Template written to {}", path);
            Ok(())
        }
        Command::Serve { host, port } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            // 啟動前先確認活頁簿與設定
            check(&config).await?;
            server::serve(config, storage).await
        }
    }
}

async fn check(config: &AppConfig) -> anyhow::Result<()> {
    println!("🔍 Running diagnostics...");
    let report = Diagnostics::run(config).await;
    for check in &report.checks {
        let mark = if check.passed { "✅" } else { "❌" };
        println!("  {} {}: {}", mark, check.name, check.detail);
    }
    println!();

    if report.passed() {
        println!("✅ All checks passed");
        return Ok(());
    }
    let failures: Vec<String> = report
        .failures()
        .iter()
        .map(|c| format!("{}: {}", c.name, c.detail))
        .collect();
    println!("❌ {} check(s) failed, fix and re-run", failures.len());
    Err(InventoryError::ValidationError { errors: failures }.into())
}

async fn load_ledger(
    storage: &LocalStorage,
    config: &AppConfig,
    catalog: &ProductCatalog,
) -> anyhow::Result<Ledger> {
    let path = config.paths.workbook.to_string_lossy().to_string();
    if !storage.exists(&path).await {
        return Err(InventoryError::not_found(format!("workbook {}", path)).into());
    }
    let workbook = Workbook::load(storage, &path).await?;
    let snapshot = parse_inventory(&workbook, config, catalog)?;
    for warning in &snapshot.warnings {
        tracing::warn!("⚠️ {}", warning);
    }
    Ok(Ledger::from_snapshot(catalog, &snapshot, &config.thresholds))
}

async fn summary(storage: &LocalStorage, config: &AppConfig) -> anyhow::Result<()> {
    let catalog = ProductCatalog::from_config(config);
    let ledger = load_ledger(storage, config, &catalog).await?;
    let summary = ledger.summary();

    println!("📋 Inventory Summary:");
    println!("  Products: {}", summary.product_count);
    println!("  Total units: {}", format::number(summary.total_units));
    println!("  Total value: {}", format::currency(summary.total_value));
    println!("  Average stock: {:.1}", summary.average_stock);
    println!("  Needs reorder: {}", summary.reorder_needed);
    if summary.closing_variances > 0 {
        println!("  ⚠️ Closing stock mismatches: {}", summary.closing_variances);
    }
    println!();

    println!("  {:<28} {:>10} {:>8} {:>8}  Status", "Product", "Stock", "Min", "Max");
    for item in ledger.items() {
        println!(
            "  {:<28} {:>10} {:>8} {:>8}  {}",
            item.product.display_name(),
            format::number(item.current_stock),
            item.min_stock,
            item.max_stock,
            item.status.label()
        );
    }
    Ok(())
}

async fn report(
    storage: LocalStorage,
    config: AppConfig,
    args: ReportArgs,
    monitor: bool,
) -> anyhow::Result<()> {
    let kinds = if args.kind.is_empty() {
        ReportKind::ALL.to_vec()
    } else {
        args.kind
    };
    let formats = if args.format.is_empty() {
        config
            .export
            .formats
            .iter()
            .map(|f| f.parse::<ReportFormat>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(InventoryError::config)?
    } else {
        args.format
    };

    let mut request = ReportRequest::new(kinds, formats);
    request.valuation = args.valuation;
    request.zip = args.zip || config.export.compress;
    request.range = match (args.from, args.to) {
        (None, None) => None,
        (from, to) => {
            let today = Local::now().date_naive();
            Some(DateRange::new(
                from.unwrap_or(chrono::NaiveDate::MIN),
                to.unwrap_or(today),
            ))
        }
    };

    let pipeline = ReportPipeline::new(storage, config, request);
    let engine = ReportEngine::new_with_monitoring(pipeline, monitor);
    let paths = engine.run().await?;

    println!("✅ Reports generated successfully!");
    for path in paths {
        println!("📁 {}", path.display());
    }
    Ok(())
}

async fn record(storage: &LocalStorage, config: &AppConfig, args: RecordArgs) -> anyhow::Result<()> {
    let catalog = ProductCatalog::from_config(config);
    let backups = BackupService::new(config);
    let fields: HashMap<String, String> = args.fields.into_iter().collect();
    let entry = Entry::from_form(args.kind, &FormFields::from(fields));

    let outcome = Recorder::new(storage, config, &catalog)
        .with_backups(&backups)
        .record(&entry, Local::now().date_naive())
        .await?;

    println!(
        "✅ {} saved to '{}' row {}",
        args.kind.title(),
        outcome.sheet,
        outcome.row
    );
    for warning in &outcome.warnings {
        println!("⚠️ {}", warning);
    }
    if let Some(name) = outcome.backup {
        println!("🗄️ Backup: {}", name);
    }
    Ok(())
}

fn print_backup(info: &BackupInfo) {
    println!(
        "  {:<44} {:<12} {:>10}  {}  {}",
        info.file_name,
        info.backup_type.map(|t| t.label()).unwrap_or("Unknown"),
        format::file_size(info.size_bytes),
        info.created.format("%Y-%m-%d %H:%M:%S"),
        info.description
    );
}

async fn backup(config: &AppConfig, command: BackupCommand) -> anyhow::Result<()> {
    let service = BackupService::new(config);
    match command {
        BackupCommand::Create { description } => {
            let info = service.create_manual(&description).await?;
            println!("✅ Backup created: {}", info.file_name);
        }
        BackupCommand::Full => {
            let info = service.create_full_system().await?;
            println!(
                "✅ Full backup created: {} ({})",
                info.file_name,
                format::file_size(info.size_bytes)
            );
        }
        BackupCommand::List => {
            let backups = service.list().await?;
            if backups.is_empty() {
                println!("No backups in {}", service.backup_dir().display());
            }
            for info in &backups {
                print_backup(info);
            }
        }
        BackupCommand::Restore { name } => {
            let safety = service.restore(&name).await?;
            println!("✅ Restored workbook from {}", name);
            if let Some(info) = safety {
                println!("🗄️ Previous workbook saved as {}", info.file_name);
            }
        }
        BackupCommand::Delete { name } => {
            service.delete(&name).await?;
            println!("🗑️ Deleted {}", name);
        }
        BackupCommand::Verify { name } => {
            let report = service.verify(&name).await?;
            for check in &report.checks {
                println!("  • {}", check);
            }
            if !report.valid {
                return Err(InventoryError::ValidationError {
                    errors: vec![format!("backup {} failed verification", name)],
                }
                .into());
            }
            println!("✅ {} is valid", name);
        }
        BackupCommand::Cleanup => {
            let removed = service.cleanup().await?;
            println!("🧹 Removed {} old backup(s)", removed);
        }
        BackupCommand::Stats => {
            let stats = service.statistics().await?;
            println!("📊 Backup Statistics:");
            println!("  Total backups: {}", stats.total_backups);
            println!("  Total size: {}", format::file_size(stats.total_size_bytes));
            println!("  Average size: {}", format::file_size(stats.average_size_bytes));
            if let (Some(oldest), Some(newest)) = (stats.oldest, stats.newest) {
                println!("  Oldest: {}", oldest.format("%Y-%m-%d %H:%M"));
                println!("  Newest: {}", newest.format("%Y-%m-%d %H:%M"));
            }
            for (label, count) in &stats.by_type {
                println!("  {}: {}", label, count);
            }
        }
        BackupCommand::Log => {
            print!("{}", service.export_log().await?);
        }
    }
    Ok(())
}
