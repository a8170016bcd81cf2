//! 录像与截图 (Recorder)
//!
//! 录像是一个可取消的后台线程: 每 `interval_ms` 取最新一帧编码为 JPEG,
//! 顺序写入 `vid_<时间>.mjpeg`。文件句柄只属于录像线程, 停止 / Drop
//! 时刷新并关闭。截图在下一帧到来时写入 `shot_<时间>.jpg`。

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{RecvTimeoutError, Sender};
use image::RgbImage;
use tracing::{error, info, warn};

use crate::config::RecordingConfig;
use crate::{encode_jpeg, gen_time_string};

type LatestFrame = Arc<Mutex<Option<RgbImage>>>;

struct Session {
    path: PathBuf,
    stop_tx: Sender<()>,
    worker: JoinHandle<Result<u64>>,
}

pub struct Recorder {
    config: RecordingConfig,
    latest: LatestFrame,
    session: Mutex<Option<Session>>,
    snapshot_requested: AtomicBool,
}

impl Recorder {
    pub fn new(config: &RecordingConfig) -> Self {
        Self {
            config: config.clone(),
            latest: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
            snapshot_requested: AtomicBool::new(false),
        }
    }

    fn session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_recording(&self) -> bool {
        self.session().is_some()
    }

    /// 切换录像, 返回切换后是否在录像
    pub fn toggle(&self) -> Result<bool> {
        let mut session = self.session();
        match session.take() {
            Some(s) => {
                finish(s);
                Ok(false)
            }
            None => {
                *session = Some(self.start()?);
                Ok(true)
            }
        }
    }

    /// 停止录像 (未录像时无操作)
    pub fn stop(&self) {
        if let Some(s) = self.session().take() {
            finish(s);
        }
    }

    /// 请求在下一帧截图
    pub fn request_snapshot(&self) {
        self.snapshot_requested.store(true, Ordering::SeqCst);
    }

    /// 提交一帧 (录像的最新帧 / 待处理的截图), 返回截图路径
    pub fn submit(&self, frame: &RgbImage) -> Option<PathBuf> {
        if self.is_recording() {
            *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = Some(frame.clone());
        }
        if !self.snapshot_requested.swap(false, Ordering::SeqCst) {
            return None;
        }
        match self.save_snapshot(frame) {
            Ok(path) => {
                info!("📸 截图已保存: {}", path.display());
                Some(path)
            }
            Err(e) => {
                warn!("⚠️ 截图失败: {:#}", e);
                None
            }
        }
    }

    fn save_snapshot(&self, frame: &RgbImage) -> Result<PathBuf> {
        fs::create_dir_all(&self.config.snapshot_dir)?;
        let path = self
            .config
            .snapshot_dir
            .join(format!("shot_{}.jpg", gen_time_string("_")));
        let jpeg = encode_jpeg(frame, self.config.jpeg_quality)?;
        fs::write(&path, jpeg).with_context(|| format!("failed writing {}", path.display()))?;
        Ok(path)
    }

    fn start(&self) -> Result<Session> {
        fs::create_dir_all(&self.config.dir)
            .with_context(|| format!("failed creating {}", self.config.dir.display()))?;
        let path = self
            .config
            .dir
            .join(format!("vid_{}.mjpeg", gen_time_string("_")));
        let file = File::create(&path)
            .with_context(|| format!("failed creating {}", path.display()))?;

        *self.latest.lock().unwrap_or_else(|e| e.into_inner()) = None;
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let latest = Arc::clone(&self.latest);
        let interval = Duration::from_millis(self.config.interval_ms.max(1));
        let quality = self.config.jpeg_quality;

        let worker = std::thread::Builder::new()
            .name("recorder".into())
            .spawn(move || -> Result<u64> {
                let mut writer = BufWriter::new(file);
                let mut frames = 0u64;
                loop {
                    match stop_rx.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let frame = latest.lock().unwrap_or_else(|e| e.into_inner()).clone();
                    if let Some(frame) = frame {
                        writer.write_all(&encode_jpeg(&frame, quality)?)?;
                        frames += 1;
                    }
                }
                writer.flush()?;
                Ok(frames)
            })
            .context("failed to spawn recorder thread")?;

        info!("🔴 开始录像: {}", path.display());
        Ok(Session {
            path,
            stop_tx,
            worker,
        })
    }
}

fn finish(session: Session) {
    let _ = session.stop_tx.try_send(());
    match session.worker.join() {
        Ok(Ok(frames)) => info!("⏹️ 录像结束: {} ({}帧)", session.path.display(), frames),
        Ok(Err(e)) => error!("❌ 录像写入失败 {}: {:#}", session.path.display(), e),
        Err(_) => error!("❌ 录像线程崩溃: {}", session.path.display()),
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.stop();
    }
}
