use crate::domain::model::InventorySnapshot;
use crate::domain::report::Report;
use crate::utils::error::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
    fn exists(&self, path: &str) -> impl std::future::Future<Output = bool> + Send;
}

pub trait ConfigProvider: Send + Sync {
    fn workbook_path(&self) -> &Path;
    fn exports_dir(&self) -> &Path;
    fn backups_dir(&self) -> &Path;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<InventorySnapshot>;
    async fn transform(&self, snapshot: InventorySnapshot) -> Result<Vec<Report>>;
    async fn load(&self, reports: Vec<Report>) -> Result<Vec<PathBuf>>;
}
