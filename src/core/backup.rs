use crate::config::{AppConfig, APP_VERSION};
use crate::core::workbook::Workbook;
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{InventoryError, Result};
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

const DATA_FILE_EXTENSIONS: [&str; 3] = ["xlsx", "csv", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackupType {
    Manual,
    Automatic,
    FullSystem,
    PreRestore,
}

impl BackupType {
    pub const ALL: [BackupType; 4] = [
        BackupType::Manual,
        BackupType::Automatic,
        BackupType::FullSystem,
        BackupType::PreRestore,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Manual => "manual_backup",
            Self::Automatic => "auto_backup",
            Self::FullSystem => "full_system_backup",
            Self::PreRestore => "pre_restore_backup",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Manual => "Manual",
            Self::Automatic => "Automatic",
            Self::FullSystem => "Full System",
            Self::PreRestore => "Pre-Restore",
        }
    }

    fn extension(&self) -> &'static str {
        match self {
            Self::FullSystem => "zip",
            _ => "xlsx",
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| name.starts_with(t.prefix()))
    }
}

/// JSON sidecar written next to every backup file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupMetadata {
    pub backup_type: BackupType,
    pub created_date: NaiveDateTime,
    pub description: String,
    pub source_file: String,
    pub file_size: u64,
    pub app_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub file_name: String,
    pub backup_type: Option<BackupType>,
    pub size_bytes: u64,
    pub created: NaiveDateTime,
    pub description: String,
    pub app_version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub file_name: String,
    pub valid: bool,
    pub checks: Vec<String>,
    pub metadata: Option<BackupMetadata>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BackupStatistics {
    pub total_backups: usize,
    pub total_size_bytes: u64,
    pub average_size_bytes: u64,
    pub oldest: Option<NaiveDateTime>,
    pub newest: Option<NaiveDateTime>,
    pub by_type: Vec<(String, usize)>,
}

fn now() -> NaiveDateTime {
    Local::now().naive_local()
}

fn sidecar_path(path: &Path) -> PathBuf {
    path.with_extension("json")
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.is_ok_and(|m| m.is_file())
}

/// 遞迴收集目錄下的檔案，略過 `exclude` 底下的路徑
async fn collect_files(root: &Path, exclude: &[&Path]) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if exclude.iter().any(|ex| path.starts_with(ex)) {
                continue;
            }
            match entry.file_type().await {
                Ok(kind) if kind.is_dir() => stack.push(path),
                Ok(_) => files.push(path),
                Err(_) => continue,
            }
        }
    }
    files.sort();
    files
}

/// Copies of the workbook, plus whole-system zip archives, kept in one directory.
#[derive(Debug, Clone)]
pub struct BackupService {
    workbook: PathBuf,
    backup_dir: PathBuf,
    data_dir: PathBuf,
    logs_dir: PathBuf,
    config_file: Option<PathBuf>,
    max_backups: usize,
    include_logs_days: i64,
}

impl BackupService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            workbook: config.workbook_path().to_path_buf(),
            backup_dir: config.backups_dir().to_path_buf(),
            data_dir: config.paths.data_dir.clone(),
            logs_dir: config
                .logging
                .directory
                .clone()
                .unwrap_or_else(|| config.paths.logs_dir.clone()),
            config_file: config.source_path.clone(),
            max_backups: config.backup.max_backups.max(1),
            include_logs_days: config.backup.include_logs_days,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// Rejects anything that is not a bare file name inside the backup directory.
    async fn resolve(&self, file_name: &str) -> Result<PathBuf> {
        let bare = Path::new(file_name).file_name().and_then(|n| n.to_str());
        if bare != Some(file_name) || file_name.starts_with('.') {
            return Err(InventoryError::ValidationError {
                errors: vec![format!("'{}' is not a backup file name", file_name)],
            });
        }
        let path = self.backup_dir.join(file_name);
        if !tokio::fs::try_exists(&path).await? {
            return Err(InventoryError::not_found(format!("backup '{}'", file_name)));
        }
        Ok(path)
    }

    /// `<prefix>_<YYYYmmdd_HHMMSS>.<ext>`, with `_<n>` appended while the name is taken.
    async fn unique_path(&self, backup_type: BackupType) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.backup_dir).await?;
        let stem = format!("{}_{}", backup_type.prefix(), now().format("%Y%m%d_%H%M%S"));
        let ext = backup_type.extension();

        let mut candidate = self.backup_dir.join(format!("{}.{}", stem, ext));
        let mut n = 1;
        while tokio::fs::try_exists(&candidate).await? {
            candidate = self.backup_dir.join(format!("{}_{}.{}", stem, n, ext));
            n += 1;
        }
        Ok(candidate)
    }

    async fn write_metadata(
        &self,
        path: &Path,
        backup_type: BackupType,
        description: &str,
    ) -> Result<BackupInfo> {
        let file_size = tokio::fs::metadata(path).await?.len();
        let metadata = BackupMetadata {
            backup_type,
            created_date: now(),
            description: description.to_string(),
            source_file: self.workbook.to_string_lossy().to_string(),
            file_size,
            app_version: APP_VERSION.to_string(),
        };
        tokio::fs::write(sidecar_path(path), serde_json::to_vec_pretty(&metadata)?).await?;

        Ok(BackupInfo {
            file_name: path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default(),
            backup_type: Some(backup_type),
            size_bytes: file_size,
            created: metadata.created_date,
            description: metadata.description,
            app_version: metadata.app_version,
        })
    }

    async fn copy_workbook(&self, backup_type: BackupType, description: &str) -> Result<BackupInfo> {
        if !tokio::fs::try_exists(&self.workbook).await? {
            return Err(InventoryError::not_found(format!(
                "workbook {}",
                self.workbook.display()
            )));
        }
        let target = self.unique_path(backup_type).await?;
        tokio::fs::copy(&self.workbook, &target).await?;
        let info = self.write_metadata(&target, backup_type, description).await?;
        tracing::info!("🗄️ {} backup created: {}", backup_type.label(), info.file_name);
        Ok(info)
    }

    pub async fn create_manual(&self, description: &str) -> Result<BackupInfo> {
        let info = self.copy_workbook(BackupType::Manual, description).await?;
        self.cleanup().await?;
        Ok(info)
    }

    pub async fn create_automatic(&self, description: &str) -> Result<BackupInfo> {
        let info = self.copy_workbook(BackupType::Automatic, description).await?;
        self.cleanup().await?;
        Ok(info)
    }

    /// Zip of the workbook, config file, data files, recent logs and `system_info.json`.
    pub async fn create_full_system(&self) -> Result<BackupInfo> {
        let mut entries: BTreeMap<String, PathBuf> = BTreeMap::new();

        if let Some(name) = self.workbook.file_name() {
            if is_file(&self.workbook).await {
                entries.insert(format!("data/{}", name.to_string_lossy()), self.workbook.clone());
            }
        }
        if let Some(config_file) = self.config_file.as_ref() {
            if let (Some(name), true) = (config_file.file_name(), is_file(config_file).await) {
                entries.insert(format!("config/{}", name.to_string_lossy()), config_file.clone());
            }
        }

        for path in collect_files(&self.data_dir, &[self.backup_dir.as_path()]).await {
            let is_data = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| DATA_FILE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
            if !is_data || path == self.workbook {
                continue;
            }
            if let Ok(relative) = path.strip_prefix(&self.data_dir) {
                entries.insert(
                    format!("data/files/{}", relative.to_string_lossy().replace('\\', "/")),
                    path.clone(),
                );
            }
        }

        let cutoff = (self.include_logs_days.max(0) as u64)
            .checked_mul(86_400)
            .and_then(|secs| SystemTime::now().checked_sub(Duration::from_secs(secs)))
            .unwrap_or(SystemTime::UNIX_EPOCH);
        for path in collect_files(&self.logs_dir, &[]).await {
            let is_log = path
                .file_name()
                .map(|n| n.to_string_lossy().contains(".log"))
                .unwrap_or(false);
            let recent = tokio::fs::metadata(&path)
                .await
                .and_then(|m| m.modified())
                .map(|modified| modified >= cutoff)
                .unwrap_or(false);
            if is_log && recent {
                if let Some(name) = path.file_name() {
                    entries.insert(format!("logs/{}", name.to_string_lossy()), path.clone());
                }
            }
        }

        let system_info = serde_json::json!({
            "backup_date": now(),
            "backup_type": BackupType::FullSystem,
            "app_version": APP_VERSION,
            "files": entries.keys().collect::<Vec<_>>(),
        });

        let mut zip = ZipWriter::new(std::io::Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, path) in &entries {
            let data = tokio::fs::read(path).await?;
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&data)?;
        }
        zip.start_file("system_info.json", options)?;
        zip.write_all(serde_json::to_string_pretty(&system_info)?.as_bytes())?;
        let zip_data = zip.finish()?.into_inner();

        let target = self.unique_path(BackupType::FullSystem).await?;
        tokio::fs::write(&target, &zip_data).await?;
        let info = self
            .write_metadata(
                &target,
                BackupType::FullSystem,
                &format!("Full system backup ({} files)", entries.len()),
            )
            .await?;
        tracing::info!("🗄️ Full system backup created: {} ({} files)", info.file_name, entries.len());
        self.cleanup().await?;
        Ok(info)
    }

    /// Newest first.
    pub async fn list(&self) -> Result<Vec<BackupInfo>> {
        if !tokio::fs::try_exists(&self.backup_dir).await? {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.backup_dir).await?;
        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();
            let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if !name.contains("backup") || !matches!(ext, "xlsx" | "zip") {
                continue;
            }

            let stat = match entry.metadata().await {
                Ok(stat) => stat,
                Err(e) => {
                    tracing::warn!("Skipping backup {}: {}", name, e);
                    continue;
                }
            };
            let metadata = read_metadata(&path).await;
            let modified = stat
                .modified()
                .map(|t| DateTime::<Local>::from(t).naive_local())
                .unwrap_or_else(|_| now());

            backups.push(BackupInfo {
                backup_type: metadata
                    .as_ref()
                    .map(|m| m.backup_type)
                    .or_else(|| BackupType::from_file_name(&name)),
                size_bytes: stat.len(),
                created: metadata.as_ref().map(|m| m.created_date).unwrap_or(modified),
                description: metadata
                    .as_ref()
                    .map(|m| m.description.clone())
                    .unwrap_or_else(|| "No description".to_string()),
                app_version: metadata
                    .map(|m| m.app_version)
                    .unwrap_or_else(|| "Unknown".to_string()),
                file_name: name,
            });
        }

        backups.sort_by(|a, b| {
            b.created
                .cmp(&a.created)
                .then_with(|| b.file_name.cmp(&a.file_name))
        });
        Ok(backups)
    }

    /// Removes the backup and its sidecar.
    pub async fn delete(&self, file_name: &str) -> Result<()> {
        let path = self.resolve(file_name).await?;
        tokio::fs::remove_file(&path).await?;
        let sidecar = sidecar_path(&path);
        if tokio::fs::try_exists(&sidecar).await? {
            tokio::fs::remove_file(&sidecar).await?;
        }
        tracing::info!("🗑️ Deleted backup {}", file_name);
        Ok(())
    }

    /// Deletes the oldest backups beyond `max_backups`; returns how many went.
    pub async fn cleanup(&self) -> Result<usize> {
        let backups = self.list().await?;
        if backups.len() <= self.max_backups {
            return Ok(0);
        }
        let stale = &backups[self.max_backups..];
        for backup in stale {
            self.delete(&backup.file_name).await?;
        }
        tracing::info!("Cleaned up {} old backups", stale.len());
        Ok(stale.len())
    }

    /// Copies the backup over the workbook after taking a pre-restore copy.
    /// Returns the pre-restore backup when there was a workbook to save.
    pub async fn restore(&self, file_name: &str) -> Result<Option<BackupInfo>> {
        let path = self.resolve(file_name).await?;
        let data = tokio::fs::read(&path).await?;

        let workbook_bytes = if path.extension().and_then(|e| e.to_str()) == Some("zip") {
            self.workbook_from_archive(data)?
        } else {
            data
        };
        // 還原前先確認內容可讀
        Workbook::from_bytes(&workbook_bytes)?;

        let pre_restore = if tokio::fs::try_exists(&self.workbook).await? {
            Some(
                self.copy_workbook(BackupType::PreRestore, &format!("Before restoring {}", file_name))
                    .await?,
            )
        } else {
            None
        };

        if let Some(parent) = self.workbook.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.workbook, &workbook_bytes).await?;
        tracing::info!("♻️ Restored {} to {}", file_name, self.workbook.display());
        Ok(pre_restore)
    }

    fn workbook_from_archive(&self, data: Vec<u8>) -> Result<Vec<u8>> {
        let name = self
            .workbook
            .file_name()
            .map(|n| format!("data/{}", n.to_string_lossy()))
            .ok_or_else(|| InventoryError::config("workbook path has no file name"))?;

        let mut archive = ZipArchive::new(std::io::Cursor::new(data))?;
        let mut entry = archive
            .by_name(&name)
            .map_err(|_| InventoryError::not_found(format!("{} in archive", name)))?;
        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    pub async fn verify(&self, file_name: &str) -> Result<VerifyReport> {
        let path = self.resolve(file_name).await?;
        let data = tokio::fs::read(&path).await?;
        let mut report = VerifyReport {
            file_name: file_name.to_string(),
            valid: true,
            checks: Vec::new(),
            metadata: None,
        };

        if data.is_empty() {
            report.valid = false;
            report.checks.push("File is empty".to_string());
        } else {
            report
                .checks
                .push(format!("File size: {}", crate::utils::format::file_size(data.len() as u64)));
        }

        match path.extension().and_then(|e| e.to_str()) {
            Some("zip") => match ZipArchive::new(std::io::Cursor::new(&data)) {
                Ok(archive) => report
                    .checks
                    .push(format!("ZIP file valid - {} files", archive.len())),
                Err(e) => {
                    report.valid = false;
                    report.checks.push(format!("ZIP file corrupted: {}", e));
                }
            },
            _ => match Workbook::from_bytes(&data) {
                Ok(workbook) => report.checks.push(format!(
                    "Excel file valid - {} sheets",
                    workbook.sheet_names().len()
                )),
                Err(e) => {
                    report.valid = false;
                    report.checks.push(format!("Excel file corrupted: {}", e));
                }
            },
        }

        let sidecar = sidecar_path(&path);
        if tokio::fs::try_exists(&sidecar).await? {
            match read_metadata(&path).await {
                Some(metadata) => {
                    report.checks.push("Metadata file valid".to_string());
                    report.metadata = Some(metadata);
                }
                None => report.checks.push("Metadata file unreadable".to_string()),
            }
        } else {
            report.checks.push("No metadata file found".to_string());
        }

        Ok(report)
    }

    pub async fn statistics(&self) -> Result<BackupStatistics> {
        let backups = self.list().await?;
        if backups.is_empty() {
            return Ok(BackupStatistics::default());
        }

        let total_size_bytes: u64 = backups.iter().map(|b| b.size_bytes).sum();
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        for backup in &backups {
            let label = backup
                .backup_type
                .map(|t| t.label())
                .unwrap_or("Unknown");
            *by_type.entry(label.to_string()).or_default() += 1;
        }

        Ok(BackupStatistics {
            total_backups: backups.len(),
            total_size_bytes,
            average_size_bytes: total_size_bytes / backups.len() as u64,
            oldest: backups.last().map(|b| b.created),
            newest: backups.first().map(|b| b.created),
            by_type: by_type.into_iter().collect(),
        })
    }

    /// Backup history as CSV.
    pub async fn export_log(&self) -> Result<String> {
        let backups = self.list().await?;
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(["Filename", "Type", "Size(MB)", "Created", "Description"])?;
        for backup in &backups {
            writer.write_record([
                backup.file_name.clone(),
                backup
                    .backup_type
                    .map(|t| t.label().to_string())
                    .unwrap_or_else(|| "Unknown".to_string()),
                format!("{:.2}", backup.size_bytes as f64 / (1024.0 * 1024.0)),
                backup.created.format("%Y-%m-%d %H:%M:%S").to_string(),
                backup.description.clone(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| InventoryError::processing(format!("csv flush: {}", e)))?;
        Ok(String::from_utf8_lossy(&bytes).to_string())
    }
}

async fn read_metadata(path: &Path) -> Option<BackupMetadata> {
    let raw = tokio::fs::read(sidecar_path(path)).await.ok()?;
    serde_json::from_slice(&raw).ok()
}
