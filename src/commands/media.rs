use super::queue::validate_url;
use crate::database::DownloadedMedia;
use crate::error::AppError;
use crate::services::Services;

/// Download a source URL directly, outside the queue. Nothing is stored.
pub async fn fetch_media(services: &Services, url: &str) -> Result<DownloadedMedia, AppError> {
    let url = url.trim();
    validate_url(url).map_err(AppError::Validation)?;

    log::info!("Direct fetch of {}", url);
    services
        .downloader
        .download(url)
        .await
        .map_err(AppError::collaborator)
}
