use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};

use teloxide::{
    types::{ChatId, MessageId, UserId},
    utils::html,
};

use super::{CoverSource, Event, IncomingFile, Session, SessionState};
use crate::{
    access::AccessStore,
    config::Config,
    errors::{BotError, BotResult, HandlerResult},
    keyboards::{self, CoverChoice, Keyboard},
    media::{MediaToolkit, TranscodeJob},
    transport::ChatTransport,
    utils,
};

type SessionSlot = Arc<tokio::sync::Mutex<Session>>;

/// Drives every user's [`Session`]. Events of one user are applied one at
/// a time; different users proceed independently.
pub struct Pipeline {
    transport: Arc<dyn ChatTransport>,
    access: Arc<dyn AccessStore>,
    media: Arc<dyn MediaToolkit>,
    config: Arc<Config>,
    sessions: Mutex<HashMap<UserId, SessionSlot>>,
}

impl Pipeline {
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        access: Arc<dyn AccessStore>,
        media: Arc<dyn MediaToolkit>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            transport,
            access,
            media,
            config,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    fn slot(&self, user: UserId) -> SessionSlot {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions
            .entry(user)
            .or_insert_with(|| {
                Arc::new(tokio::sync::Mutex::new(Session::new(&self.config.default_cover)))
            })
            .clone()
    }

    /// Forgets an idle session nobody else is waiting on.
    fn release(&self, user: UserId, slot: &SessionSlot) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let unused = sessions
            .get(&user)
            .is_some_and(|current| Arc::ptr_eq(current, slot) && Arc::strong_count(slot) == 2);
        if unused {
            sessions.remove(&user);
        }
    }

    pub async fn state(&self, user: UserId) -> SessionState {
        let slot = {
            let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
            sessions.get(&user).cloned()
        };
        match slot {
            Some(slot) => slot.lock().await.state,
            None => SessionState::Idle,
        }
    }

    /// Drops the user's running session, if any, without a reply.
    pub async fn reset(&self, user: UserId, chat: ChatId) {
        let slot = self.slot(user);
        {
            let mut session = slot.lock().await;
            if session.is_active() {
                self.terminate(chat, &mut session).await;
            }
        }
        self.release(user, &slot);
    }

    pub async fn handle(&self, user: UserId, chat: ChatId, event: Event) -> HandlerResult {
        let slot = self.slot(user);
        let idle = {
            let mut session = slot.lock().await;
            if let Err(err) = self.step(user, chat, &mut session, event).await {
                log::error!("Pipeline step failed for user {}: {}", user.0, err);
                self.abort(chat, &mut session, &err).await;
            }
            !session.is_active()
        };
        if idle {
            self.release(user, &slot);
        }
        Ok(())
    }

    async fn step(
        &self,
        user: UserId,
        chat: ChatId,
        session: &mut Session,
        event: Event,
    ) -> BotResult<()> {
        use SessionState::*;

        match (session.state, event) {
            (_, Event::Start) => self.start(user, chat, session).await,
            (Idle, Event::Cancel) => {
                self.transport
                    .send_text(chat, "Нечего отменять.", Some(self.main_menu()))
                    .await?;
                Ok(())
            }
            (_, Event::Cancel) => {
                self.terminate(chat, session).await;
                self.transport
                    .send_text(chat, "✖️ Отменено.", Some(self.main_menu()))
                    .await?;
                Ok(())
            }
            (AwaitingAudio, Event::AudioUploaded(file)) => {
                self.audio_received(user, chat, session, file).await
            }
            (AwaitingTrimChoice, Event::TrimChosen(offset)) => {
                self.trim_chosen(user, chat, session, offset).await
            }
            (AwaitingCoverChoice, Event::CoverChosen(choice)) => {
                self.cover_chosen(user, chat, session, choice).await
            }
            (AwaitingCustomCover, Event::ImageUploaded(file) | Event::AudioUploaded(file)) => {
                self.image_received(user, chat, session, file).await
            }
            (AwaitingCustomCover, Event::BackToCover) => {
                session.state = AwaitingCoverChoice;
                self.ask_cover(chat, session).await
            }
            (state, event) => {
                log::debug!("Ignoring {:?} in state {:?} for user {}", event, state, user.0);
                Ok(())
            }
        }
    }

    async fn start(&self, user: UserId, chat: ChatId, session: &mut Session) -> BotResult<()> {
        if session.is_active() {
            log::info!("User {} restarted the pipeline from {:?}", user.0, session.state);
            self.terminate(chat, session).await;
        }

        self.refresh_subscription(user).await?;
        if !self.access.check_access(user.0).await? {
            log::info!("Access denied for user {}", user.0);
            self.transport
                .send_text(chat, &self.denial_text(user), Some(self.main_menu()))
                .await?;
            return Ok(());
        }

        session.state = SessionState::AwaitingAudio;
        self.prompt(
            chat,
            session,
            "🎵 Отправьте аудиофайл (mp3, flac, m4a), из которого сделать кружок.",
            keyboards::cancel_keyboard(),
        )
        .await
    }

    /// Stores the current channel membership as the subscription flag.
    pub async fn refresh_subscription(&self, user: UserId) -> BotResult<bool> {
        let member = match self.config.required_channel {
            Some(channel) => match self.transport.is_channel_member(channel, user).await {
                Ok(member) => member,
                Err(e) => {
                    log::warn!("Membership check failed for user {}: {}", user.0, e);
                    false
                }
            },
            None => true,
        };
        self.access.set_subscribed(user.0, member).await?;
        Ok(member)
    }

    pub fn denial_text(&self, user: UserId) -> String {
        let notice = BotError::AccessDenied(user.0).user_notice();
        match &self.config.channel_link {
            Some(link) => format!("{notice}\n\nКанал: {}", html::escape(link)),
            None => notice.to_owned(),
        }
    }

    pub fn main_menu(&self) -> Keyboard {
        keyboards::main_menu(self.config.support_url.as_deref())
    }

    async fn audio_received(
        &self,
        user: UserId,
        chat: ChatId,
        session: &mut Session,
        file: IncomingFile,
    ) -> BotResult<()> {
        let mime = file.mime.as_deref();
        let name = file.file_name.as_deref();
        if !utils::is_accepted_audio(mime, name) {
            let err = BotError::unsupported_media_type(mime.unwrap_or("unknown"));
            log::info!("User {}: {}", user.0, err);
            return self.notice(chat, session, err.user_notice()).await;
        }

        let ext = utils::audio_extension(mime, name);
        let source = self.work_path("audio", user, &ext);
        session.tracker.track_file(&source);
        self.transport.download_file(&file.file_id, &source).await?;

        let label = match file.platform_label() {
            Some(label) => label,
            None => self
                .media
                .read_tags(&source)
                .await
                .label()
                .or(file.file_name.clone())
                .unwrap_or_else(|| "Без названия".to_owned()),
        };
        log::info!("User {} uploaded '{}' ({})", user.0, label, source.display());

        session.source_path = Some(source.clone());
        session.audio_path = Some(source);
        session.track_label = label;
        session.state = SessionState::AwaitingTrimChoice;

        let text = format!(
            "🎵 <b>{}</b>\n\nС какого момента начать кружок?",
            html::escape(&session.track_label)
        );
        self.prompt(chat, session, &text, keyboards::trim_keyboard()).await
    }

    async fn trim_chosen(
        &self,
        user: UserId,
        chat: ChatId,
        session: &mut Session,
        offset: u32,
    ) -> BotResult<()> {
        let source = session
            .source_path
            .clone()
            .ok_or_else(|| BotError::general("No uploaded audio in session"))?;
        let ext = source
            .extension()
            .map(|e| e.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mp3".to_owned());

        let clip = self.work_path("clip", user, &ext);
        session.tracker.track_file(&clip);
        let clip_secs = self.media.cut_audio(&source, offset, &clip).await?;
        if clip_secs <= 0.0 {
            log::info!("User {}: offset {}s is past the end of the track", user.0, offset);
            return self
                .notice(chat, session, "⚠️ Трек короче выбранного момента. Выберите другой.")
                .await;
        }

        session.audio_path = Some(clip);
        session.trim_start = offset;
        session.clip_secs = clip_secs;

        // the real extension is picked from the picture bytes
        let cover_base = self.work_path("embedded", user, "img");
        match self.media.extract_cover(&source, &cover_base).await {
            Some(cover) => {
                session.tracker.track_file(&cover);
                session.embedded_cover = Some(cover.clone());
                session.cover = Some(CoverSource::Embedded(cover));
            }
            None => {
                let err = BotError::CoverExtractionFailed(source.display().to_string());
                log::info!("User {}: {}", user.0, err);
                session.embedded_cover = None;
                session.cover = None;
            }
        }

        session.state = SessionState::AwaitingCoverChoice;
        self.ask_cover(chat, session).await
    }

    async fn ask_cover(&self, chat: ChatId, session: &mut Session) -> BotResult<()> {
        let has_embedded = session.embedded_cover.is_some();
        let text = if has_embedded {
            "🖼 Какую обложку использовать?"
        } else {
            BotError::CoverExtractionFailed(String::new()).user_notice()
        };
        self.prompt(chat, session, text, keyboards::cover_keyboard(has_embedded))
            .await
    }

    async fn cover_chosen(
        &self,
        user: UserId,
        chat: ChatId,
        session: &mut Session,
        choice: CoverChoice,
    ) -> BotResult<()> {
        match choice {
            CoverChoice::FromFile => {
                session.cover = Some(match &session.embedded_cover {
                    Some(path) => CoverSource::Embedded(path.clone()),
                    None => CoverSource::Default,
                });
                self.finalize(user, chat, session).await
            }
            CoverChoice::Default => {
                session.cover = Some(CoverSource::Default);
                self.finalize(user, chat, session).await
            }
            CoverChoice::Custom => {
                session.state = SessionState::AwaitingCustomCover;
                self.prompt(
                    chat,
                    session,
                    "📤 Отправьте картинку для обложки.",
                    keyboards::custom_cover_keyboard(),
                )
                .await
            }
        }
    }

    async fn image_received(
        &self,
        user: UserId,
        chat: ChatId,
        session: &mut Session,
        file: IncomingFile,
    ) -> BotResult<()> {
        let mime = file.mime.as_deref();
        if !utils::is_image(mime) {
            let err = BotError::unsupported_media_type(mime.unwrap_or("unknown"));
            log::info!("User {}: {}", user.0, err);
            return self
                .notice(chat, session, "❌ Это не картинка. Отправьте фото или файл-изображение.")
                .await;
        }

        let upload = self.work_path("upload", user, utils::image_extension(mime));
        session.tracker.track_file(&upload);
        self.transport.download_file(&file.file_id, &upload).await?;

        let square = self.work_path("cover", user, "jpg");
        session.tracker.track_file(&square);
        match self.media.normalize_cover(&upload, &square).await {
            Ok(cover) => {
                session.cover = Some(CoverSource::Uploaded(cover));
                self.finalize(user, chat, session).await
            }
            Err(e) => {
                log::warn!("User {} sent an unreadable cover: {}", user.0, e);
                session.state = SessionState::AwaitingCoverChoice;
                self.notice(chat, session, "❌ Не удалось прочитать картинку.")
                    .await?;
                self.ask_cover(chat, session).await
            }
        }
    }

    /// Normalize, render, deliver; then purge and return to idle whatever
    /// happened.
    async fn finalize(&self, user: UserId, chat: ChatId, session: &mut Session) -> BotResult<()> {
        session.state = SessionState::Finalizing;

        let outcome = self.render_and_deliver(user, chat, session).await;
        self.terminate(chat, session).await;

        let text = match outcome {
            Ok(()) => "✅ Готово! Сделаем ещё один?",
            Err(err) => {
                log::error!("Video note for user {} failed: {}", user.0, err);
                err.user_notice()
            }
        };
        // the session is already closed, a lost notice must not abort it again
        if let Err(e) = self
            .transport
            .send_text(chat, text, Some(self.main_menu()))
            .await
        {
            log::error!("Failed to send the result notice to chat {}: {}", chat, e);
        }
        Ok(())
    }

    async fn render_and_deliver(
        &self,
        user: UserId,
        chat: ChatId,
        session: &mut Session,
    ) -> BotResult<()> {
        let progress = self.transport.send_text(chat, "⏳ Создаю кружок...", None).await?;
        session.tracker.track_message(progress);

        let audio = session
            .audio_path
            .clone()
            .ok_or_else(|| BotError::general("No audio in session"))?;
        let source = session.cover.take().unwrap_or(CoverSource::Default);
        let cover = self.square_cover(user, session, &source).await?;

        let job = TranscodeJob::new(
            audio,
            cover,
            session.trim_start,
            session.clip_secs,
            self.media.settings(),
        )?;
        let video = self.media.transcode(&job).await?;
        if let Err(e) = self
            .transport
            .edit_text(chat, progress, "📤 Отправляю кружок...")
            .await
        {
            log::warn!("Failed to update progress message: {}", e);
        }
        log::info!(
            "Sending {} byte video note to user {} ('{}')",
            video.len(),
            user.0,
            session.track_label
        );
        self.transport
            .send_video_note(chat, video, self.media.settings().size)
            .await
    }

    /// The chosen cover at the exact output size. An unreadable cover falls
    /// back to the default one.
    async fn square_cover(
        &self,
        user: UserId,
        session: &mut Session,
        source: &CoverSource,
    ) -> BotResult<PathBuf> {
        let default = self.config.default_cover.as_path();
        let dest = self.work_path("square", user, "jpg");
        session.tracker.track_file(&dest);

        match self.media.normalize_cover(source.resolve(default), &dest).await {
            Ok(path) => Ok(path),
            Err(e) if *source != CoverSource::Default => {
                log::warn!("Cover {:?} unusable, using default: {}", source, e);
                Ok(self.media.normalize_cover(default, &dest).await?)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Sends a tracked prompt.
    async fn prompt(
        &self,
        chat: ChatId,
        session: &mut Session,
        text: &str,
        keyboard: Keyboard,
    ) -> BotResult<()> {
        let id = self.transport.send_text(chat, text, Some(keyboard)).await?;
        session.tracker.track_message(id);
        Ok(())
    }

    /// Sends a tracked notice without changing state.
    async fn notice(&self, chat: ChatId, session: &mut Session, text: &str) -> BotResult<()> {
        let id: MessageId = self.transport.send_text(chat, text, None).await?;
        session.tracker.track_message(id);
        Ok(())
    }

    /// Terminal transition: purge everything and go idle.
    async fn terminate(&self, chat: ChatId, session: &mut Session) {
        session
            .tracker
            .purge_all(self.transport.as_ref(), chat)
            .await;
        *session = Session::new(&self.config.default_cover);
    }

    async fn abort(&self, chat: ChatId, session: &mut Session, err: &BotError) {
        self.terminate(chat, session).await;
        if let Err(e) = self
            .transport
            .send_text(chat, err.user_notice(), Some(self.main_menu()))
            .await
        {
            log::error!("Failed to report error to chat {}: {}", chat, e);
        }
    }

    fn work_path(&self, prefix: &str, user: UserId, ext: &str) -> PathBuf {
        self.config
            .work_dir
            .join(utils::unique_file_name(prefix, user.0, ext))
    }
}

#[cfg(test)]
mod tests {
    use std::{path::Path, sync::Mutex as StdMutex, time::Duration};

    use async_trait::async_trait;

    use super::*;
    use crate::{
        access::SqliteAccessStore,
        media::{EmbeddedTags, MediaError, TranscodeSettings},
        transport::testing::RecordingTransport,
    };

    const USER: UserId = UserId(100);
    const CHAT: ChatId = ChatId(100);

    /// Media toolkit that never spawns anything.
    struct FakeMedia {
        settings: TranscodeSettings,
        track_secs: f64,
        embedded: bool,
        tool_missing: bool,
        jobs: StdMutex<Vec<TranscodeJob>>,
    }

    impl FakeMedia {
        fn new(embedded: bool) -> Self {
            Self {
                settings: TranscodeSettings::default(),
                track_secs: 200.0,
                embedded,
                tool_missing: false,
                jobs: StdMutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl MediaToolkit for FakeMedia {
        fn settings(&self) -> &TranscodeSettings {
            &self.settings
        }

        async fn cut_audio(&self, source: &Path, start: u32, dest: &Path) -> Result<f64, MediaError> {
            std::fs::copy(source, dest)?;
            let left = (self.track_secs - start as f64).max(0.0);
            Ok(left.min(self.settings.ceiling_secs as f64))
        }

        async fn read_tags(&self, _audio: &Path) -> EmbeddedTags {
            EmbeddedTags {
                artist: Some("Tagged".into()),
                title: Some("Track".into()),
                picture: None,
            }
        }

        async fn extract_cover(&self, _audio: &Path, dest_base: &Path) -> Option<PathBuf> {
            if !self.embedded {
                return None;
            }
            let path = dest_base.with_extension("png");
            std::fs::write(&path, b"png").ok()?;
            Some(path)
        }

        async fn normalize_cover(&self, image: &Path, _dest: &Path) -> Result<PathBuf, MediaError> {
            if std::fs::read(image)? == b"broken" {
                return Err(MediaError::Invalid("undecodable".into()));
            }
            Ok(image.to_path_buf())
        }

        async fn transcode(&self, job: &TranscodeJob) -> Result<Vec<u8>, MediaError> {
            self.jobs.lock().unwrap().push(job.clone());
            if self.tool_missing {
                return Err(MediaError::ToolUnavailable("ffmpeg".into()));
            }
            Ok(vec![0u8; 1024])
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        config: Arc<Config>,
        transport: Arc<RecordingTransport>,
        access: Arc<SqliteAccessStore>,
        media: Arc<FakeMedia>,
        pipeline: Pipeline,
    }

    async fn harness(media: FakeMedia) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let work_dir = dir.path().join("temp");
        std::fs::create_dir_all(&work_dir).unwrap();
        let default_cover = dir.path().join("default_cover.jpg");
        std::fs::write(&default_cover, b"default").unwrap();

        let config = Arc::new(Config {
            database_url: "sqlite::memory:".into(),
            required_channel: Some(ChatId(-100)),
            channel_link: Some("https://t.me/channel".into()),
            work_dir,
            default_cover,
            admin_id: None,
            ffmpeg_bin: "ffmpeg".into(),
            ffprobe_bin: "ffprobe".into(),
            transcode_timeout: Duration::from_secs(5),
            support_url: None,
        });
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let access = Arc::new(SqliteAccessStore::from_pool(pool).await.unwrap());
        let transport = Arc::new(
            RecordingTransport::default()
                .with_file("song", b"ID3 fake mp3")
                .with_file("picture", b"fake jpeg")
                .with_file("broken-picture", b"broken"),
        );
        let media = Arc::new(media);
        let pipeline = Pipeline::new(transport.clone(), access.clone(), media.clone(), config.clone());

        Harness {
            _dir: dir,
            config,
            transport,
            access,
            media,
            pipeline,
        }
    }

    fn mp3() -> IncomingFile {
        IncomingFile {
            file_id: "song".into(),
            mime: Some("audio/mpeg".into()),
            file_name: Some("song.mp3".into()),
            performer: None,
            title: None,
        }
    }

    fn photo(id: &str) -> IncomingFile {
        let mut file = IncomingFile::new(id);
        file.mime = Some("image/jpeg".into());
        file
    }

    fn work_files(h: &Harness) -> usize {
        std::fs::read_dir(&h.config.work_dir).unwrap().count()
    }

    impl Harness {
        async fn send(&self, event: Event) {
            self.pipeline.handle(USER, CHAT, event).await.unwrap();
        }

        async fn state(&self) -> SessionState {
            self.pipeline.state(USER).await
        }

        async fn tracked(&self) -> (usize, usize) {
            let slot = self.pipeline.slot(USER);
            let session = slot.lock().await;
            (session.tracker.messages().len(), session.tracker.files().len())
        }
    }

    #[tokio::test]
    async fn non_member_is_denied_until_subscribed() {
        let h = harness(FakeMedia::new(true)).await;

        h.send(Event::Start).await;

        assert_eq!(h.state().await, SessionState::Idle);
        let record = h.access.get_access(USER.0).await.unwrap().unwrap();
        assert!(!record.subscribed);
        assert!(h.transport.texts().last().unwrap().contains("https://t.me/channel"));

        h.transport.set_member(USER.0, true);
        h.send(Event::Start).await;

        assert_eq!(h.state().await, SessionState::AwaitingAudio);
    }

    #[tokio::test]
    async fn embedded_cover_and_offset_reach_the_render_job() {
        let h = harness(FakeMedia::new(true)).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        assert_eq!(h.state().await, SessionState::AwaitingTrimChoice);
        assert!(h.transport.texts().last().unwrap().contains("Tagged - Track"));

        h.send(Event::TrimChosen(30)).await;
        assert_eq!(h.state().await, SessionState::AwaitingCoverChoice);
        assert_eq!(h.transport.last_keyboard_tags()[0], "cover_file");
        let embedded = {
            let slot = h.pipeline.slot(USER);
            let session = slot.lock().await;
            session.embedded_cover.clone().unwrap()
        };

        h.send(Event::CoverChosen(CoverChoice::FromFile)).await;

        let jobs = h.media.jobs.lock().unwrap().clone();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].trim_start, 30);
        assert_eq!(jobs[0].cover, embedded);
        assert_eq!(jobs[0].duration, 60);
        assert_eq!(h.transport.video_notes(), 1);
        assert_eq!(h.transport.edits(), vec!["📤 Отправляю кружок...".to_string()]);
        assert_eq!(h.state().await, SessionState::Idle);
        assert_eq!(h.tracked().await, (0, 0));
        assert_eq!(work_files(&h), 0);
    }

    #[tokio::test]
    async fn duration_is_what_is_left_of_the_track() {
        let mut media = FakeMedia::new(false);
        media.track_secs = 150.0;
        let h = harness(media).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        h.send(Event::TrimChosen(120)).await;
        h.send(Event::CoverChosen(CoverChoice::Default)).await;

        let jobs = h.media.jobs.lock().unwrap().clone();
        assert_eq!(jobs[0].duration, 30);
        assert_eq!(jobs[0].trim_start, 120);
    }

    #[tokio::test]
    async fn missing_cover_falls_back_to_default_asset() {
        let h = harness(FakeMedia::new(false)).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        h.send(Event::TrimChosen(0)).await;
        assert!(!h.transport.last_keyboard_tags().contains(&"cover_file".to_string()));
        h.send(Event::CoverChosen(CoverChoice::Default)).await;

        let jobs = h.media.jobs.lock().unwrap().clone();
        assert_eq!(jobs[0].cover, h.config.default_cover);
        assert_eq!(jobs[0].trim_start, 0);
        assert!(h.config.default_cover.exists());
    }

    #[tokio::test]
    async fn offset_past_track_end_keeps_waiting_for_trim() {
        let mut media = FakeMedia::new(false);
        media.track_secs = 45.0;
        let h = harness(media).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        h.send(Event::TrimChosen(90)).await;

        assert_eq!(h.state().await, SessionState::AwaitingTrimChoice);

        h.send(Event::TrimChosen(30)).await;
        assert_eq!(h.state().await, SessionState::AwaitingCoverChoice);
    }

    #[tokio::test]
    async fn missing_tool_reports_and_cleans_up() {
        let mut media = FakeMedia::new(true);
        media.tool_missing = true;
        let h = harness(media).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        h.send(Event::TrimChosen(0)).await;
        h.send(Event::CoverChosen(CoverChoice::FromFile)).await;

        assert_eq!(h.state().await, SessionState::Idle);
        let expected = BotError::ToolUnavailable("ffmpeg".into()).user_notice();
        assert_eq!(h.transport.texts().last().unwrap(), expected);
        assert_eq!(h.transport.video_notes(), 0);
        assert_eq!(h.tracked().await, (0, 0));
        assert_eq!(work_files(&h), 0);
        assert!(h.config.default_cover.exists());
    }

    #[tokio::test]
    async fn custom_cover_flow_with_back_and_retry() {
        let h = harness(FakeMedia::new(false)).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        h.send(Event::TrimChosen(0)).await;
        h.send(Event::CoverChosen(CoverChoice::Custom)).await;
        assert_eq!(h.state().await, SessionState::AwaitingCustomCover);

        h.send(Event::BackToCover).await;
        assert_eq!(h.state().await, SessionState::AwaitingCoverChoice);

        h.send(Event::CoverChosen(CoverChoice::Custom)).await;
        h.send(Event::ImageUploaded(photo("broken-picture"))).await;
        assert_eq!(h.state().await, SessionState::AwaitingCoverChoice);

        h.send(Event::CoverChosen(CoverChoice::Custom)).await;
        h.send(Event::ImageUploaded(photo("picture"))).await;

        let jobs = h.media.jobs.lock().unwrap().clone();
        assert_eq!(jobs.len(), 1);
        assert!(jobs[0].cover.starts_with(&h.config.work_dir));
        assert_eq!(h.state().await, SessionState::Idle);
        assert_eq!(work_files(&h), 0);
    }

    #[tokio::test]
    async fn out_of_state_events_are_ignored() {
        let h = harness(FakeMedia::new(false)).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::ImageUploaded(photo("picture"))).await;
        assert_eq!(h.state().await, SessionState::Idle);

        h.send(Event::Start).await;
        let sent = h.transport.sent.lock().unwrap().len();
        h.send(Event::ImageUploaded(photo("picture"))).await;
        h.send(Event::TrimChosen(30)).await;

        assert_eq!(h.state().await, SessionState::AwaitingAudio);
        assert_eq!(h.transport.sent.lock().unwrap().len(), sent);
    }

    #[tokio::test]
    async fn unsupported_audio_keeps_waiting() {
        let h = harness(FakeMedia::new(false)).await;
        h.transport.set_member(USER.0, true);
        h.send(Event::Start).await;

        let mut wav = mp3();
        wav.mime = Some("audio/wav".into());
        h.send(Event::AudioUploaded(wav)).await;

        assert_eq!(h.state().await, SessionState::AwaitingAudio);
        assert_eq!(work_files(&h), 0);
    }

    #[tokio::test]
    async fn failed_download_aborts_to_idle() {
        let h = harness(FakeMedia::new(false)).await;
        h.transport.set_member(USER.0, true);
        h.send(Event::Start).await;

        let mut missing = mp3();
        missing.file_id = "gone".into();
        h.send(Event::AudioUploaded(missing)).await;

        assert_eq!(h.state().await, SessionState::Idle);
        assert_eq!(h.tracked().await, (0, 0));
        let expected = BotError::download_failed("x").user_notice();
        assert_eq!(h.transport.texts().last().unwrap(), expected);
    }

    #[tokio::test]
    async fn cancel_purges_prompts_and_files() {
        let h = harness(FakeMedia::new(true)).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        h.send(Event::TrimChosen(60)).await;
        let (messages, files) = h.tracked().await;
        assert_eq!(messages, 3);
        assert_eq!(files, 3);

        h.send(Event::Cancel).await;

        assert_eq!(h.state().await, SessionState::Idle);
        assert_eq!(h.tracked().await, (0, 0));
        assert_eq!(h.transport.deleted().len(), 3);
        assert_eq!(work_files(&h), 0);
    }

    fn live_sessions(h: &Harness) -> usize {
        h.pipeline.sessions.lock().unwrap().len()
    }

    #[tokio::test]
    async fn idle_sessions_are_forgotten() {
        let h = harness(FakeMedia::new(false)).await;

        h.send(Event::Start).await;
        assert_eq!(live_sessions(&h), 0);

        h.transport.set_member(USER.0, true);
        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        assert_eq!(live_sessions(&h), 1);

        h.send(Event::Cancel).await;
        assert_eq!(live_sessions(&h), 0);
        assert_eq!(h.state().await, SessionState::Idle);
        assert_eq!(live_sessions(&h), 0);

        h.pipeline.reset(USER, CHAT).await;
        assert_eq!(live_sessions(&h), 0);
    }

    #[tokio::test]
    async fn lost_result_notice_does_not_abort_twice() {
        let h = harness(FakeMedia::new(false)).await;
        h.transport.set_member(USER.0, true);
        h.transport.fail_texts_containing("Готово");

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        h.send(Event::TrimChosen(0)).await;
        h.send(Event::CoverChosen(CoverChoice::Default)).await;

        assert_eq!(h.transport.video_notes(), 1);
        assert_eq!(h.state().await, SessionState::Idle);
        let failure = BotError::general("x").user_notice();
        assert!(!h.transport.texts().iter().any(|t| t == failure));
        assert_eq!(work_files(&h), 0);
    }

    #[tokio::test]
    async fn start_during_session_restarts_cleanly() {
        let h = harness(FakeMedia::new(false)).await;
        h.transport.set_member(USER.0, true);

        h.send(Event::Start).await;
        h.send(Event::AudioUploaded(mp3())).await;
        h.send(Event::Start).await;

        assert_eq!(h.state().await, SessionState::AwaitingAudio);
        assert_eq!(h.tracked().await, (1, 0));
        assert_eq!(work_files(&h), 0);
    }
}
