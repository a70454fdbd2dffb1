use thiserror::Error;

use crate::media::MediaError;

/// Централизованная система ошибок для telegram бота
#[derive(Debug, Error)]
pub enum BotError {
    /// Нет подписки, триала или безлимита
    #[error("Доступ запрещён для пользователя {0}")]
    AccessDenied(u64),
    /// Неподдерживаемый тип файла
    #[error("Неподдерживаемый тип файла: {0}")]
    UnsupportedMediaType(String),
    /// Не удалось скачать файл из Telegram
    #[error("Ошибка загрузки файла: {0}")]
    DownloadFailed(String),
    /// Обложка не извлечена, используется стандартная
    #[error("Не удалось извлечь обложку: {0}")]
    CoverExtractionFailed(String),
    /// ffmpeg/ffprobe не найдены
    #[error("Инструмент недоступен: {0}")]
    ToolUnavailable(String),
    /// Внешняя команда завершилась с ошибкой
    #[error("Ошибка конвертации: {0}")]
    TranscodeFailed(String),
    /// Ошибки базы данных
    #[error("Ошибка хранилища: {0}")]
    StorageError(String),
    /// Ошибки Telegram API
    #[error("Ошибка Telegram API: {0}")]
    Telegram(#[from] teloxide::RequestError),
    /// Ошибки файловой системы
    #[error("Ошибка файловой системы: {0}")]
    FileSystem(#[from] std::io::Error),
    /// Ошибки парсинга данных
    #[error("Ошибка парсинга: {0}")]
    Parse(String),
    /// Неверная конфигурация
    #[error("Ошибка конфигурации: {0}")]
    Config(String),
    /// Общая ошибка с описанием
    #[error("{0}")]
    General(String),
}

impl From<MediaError> for BotError {
    fn from(err: MediaError) -> Self {
        match err {
            MediaError::ToolUnavailable(tool) => BotError::ToolUnavailable(tool),
            MediaError::Io(e) => BotError::FileSystem(e),
            other => BotError::TranscodeFailed(other.to_string()),
        }
    }
}

impl From<sqlx::Error> for BotError {
    fn from(err: sqlx::Error) -> Self {
        BotError::StorageError(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for BotError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        BotError::StorageError(format!("Failed to run migrations: {}", err))
    }
}

impl From<serde_json::Error> for BotError {
    fn from(err: serde_json::Error) -> Self {
        BotError::Parse(format!("JSON parsing error: {}", err))
    }
}

// Удобные методы для создания ошибок
impl BotError {
    pub fn unsupported_media_type(mime: impl Into<String>) -> Self {
        Self::UnsupportedMediaType(mime.into())
    }

    pub fn download_failed(msg: impl Into<String>) -> Self {
        Self::DownloadFailed(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn general(msg: impl Into<String>) -> Self {
        Self::General(msg.into())
    }

    /// Текст, который увидит пользователь. Одна ошибка - одно сообщение.
    pub fn user_notice(&self) -> &'static str {
        match self {
            BotError::AccessDenied(_) => {
                "❌ Для использования бота необходимо подписаться на канал \
                или оформить доступ: /pay или /promo КОД."
            }
            BotError::UnsupportedMediaType(_) => {
                "❌ Этот формат не поддерживается. Пришлите mp3, flac или m4a."
            }
            BotError::DownloadFailed(_) | BotError::FileSystem(_) => {
                "❌ Ошибка при загрузке файла. Попробуйте ещё раз или отправьте меньший файл."
            }
            BotError::CoverExtractionFailed(_) => {
                "Обложка в файле не найдена, будет использована стандартная."
            }
            BotError::ToolUnavailable(_) => {
                "⚠️ Сервис конвертации временно недоступен. Попробуйте позже."
            }
            BotError::StorageError(_) => {
                "⚠️ Не удалось проверить доступ. Попробуйте позже."
            }
            _ => "❌ Произошла ошибка при генерации видео. Попробуйте ещё раз.",
        }
    }
}

/// Результат операций бота
pub type BotResult<T> = Result<T, BotError>;

/// Результат для хендлеров
pub type HandlerResult = BotResult<()>;
