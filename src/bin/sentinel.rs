//! 边缘安防主程序 (Weapon Sentinel)
//!
//! 线程:
//! 1. 主线程:     帧循环 (门控 → 检测 → 确认 → 状态机 → 输出)
//! 2. control:    stdin 每行一个 JSON 控制请求, stdout 每行一个应答
//! 3. notifier:   报警推送队列
//! 4. recorder:   录像 (按需)
//!
//! 运行: cargo run --bin sentinel -- --frames ./frames --simulate
use std::io::{self, BufRead, Write};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use weapon_sentinel::alarm::{HttpNotifier, LogNotifier, Notifier, QueuedNotifier};
use weapon_sentinel::detection::{RemoteDetector, ResilientDetector};
use weapon_sentinel::input::DirectorySource;
use weapon_sentinel::io::{
    self as sentinel_io, ActuatorIO, SensorIO, SimulatedActuators, SimulatedSensor,
};
use weapon_sentinel::pipeline::{
    Annotator, BasicPreprocessor, FrameLoop, HttpTransport, NullTransport, Recorder,
    ShutdownGuard, Transport,
};
use weapon_sentinel::{
    AlarmStateMachine, Args, Clock, ControlApi, DetectionOrchestrator, SentinelConfig,
    SystemClock,
};

fn main() {
    let args = Args::parse();
    init_logging(&args.log);

    if let Err(e) = run(args) {
        error!("❌ 启动/运行失败: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    // 日志走 stderr, stdout 留给控制应答
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

/// 硬件: GPIO 或模拟
fn open_io(
    args: &Args,
    config: &SentinelConfig,
) -> Result<(Arc<dyn SensorIO>, Box<dyn ActuatorIO>)> {
    if args.simulate {
        info!("🧪 模拟模式: 不访问 GPIO");
        let sensor: Arc<dyn SensorIO> = Arc::new(SimulatedSensor::new());
        let actuators: Box<dyn ActuatorIO> = Box::new(SimulatedActuators::new());
        return Ok((sensor, actuators));
    }
    let (sensor, actuators) =
        sentinel_io::gpio::open(&config.hardware).context("GPIO 初始化失败 (可用 --simulate)")?;
    let sensor: Arc<dyn SensorIO> = Arc::new(sensor);
    let actuators: Box<dyn ActuatorIO> = Box::new(actuators);
    Ok((sensor, actuators))
}

fn build_notifier(config: &SentinelConfig) -> Result<Box<dyn Notifier>> {
    let timeout = Duration::from_millis(config.notifier.timeout_ms);
    match &config.notifier.url {
        Some(url) => {
            info!("📡 报警推送: {}", url);
            let http = HttpNotifier::new(url.clone(), None, timeout);
            Ok(Box::new(QueuedNotifier::spawn(http, config.notifier.queue)?))
        }
        None => {
            warn!("⚠️ 未配置报警推送地址, 报警只写日志");
            Ok(Box::new(LogNotifier))
        }
    }
}

fn run(args: Args) -> Result<()> {
    let config = SentinelConfig::load(&args.config)?;
    config.print_summary();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (sensor, actuators) = open_io(&args, &config)?;
    let notifier = build_notifier(&config)?;

    let state = Arc::new(AlarmStateMachine::new(
        actuators,
        notifier,
        config.node.clone(),
        &config.timers,
        clock.now(),
    ));
    let recorder = Arc::new(Recorder::new(&config.recording));

    // 从这里开始, 任何返回路径都会进入 off 并复位执行器
    let _shutdown = ShutdownGuard::new(Arc::clone(&state), Arc::clone(&clock))
        .with_recorder(Arc::clone(&recorder));

    // 节点上线; 连接失败视为上游故障, 中止启动
    let presence = config.notifier.node_url.as_ref().map(|url| {
        HttpNotifier::new(
            config.notifier.url.clone().unwrap_or_default(),
            Some(url.clone()),
            Duration::from_millis(config.notifier.timeout_ms),
        )
    });
    if let Some(presence) = &presence {
        presence.set_online(true).context("节点上线失败")?;
        info!("🟢 节点 {} 已上线", config.node.node_id);
    }

    let detector = ResilientDetector::new(
        RemoteDetector::new(&config.detector),
        &config.detector,
        Arc::clone(&clock),
    );
    let annotator = match &config.overlay.font {
        Some(path) => Annotator::with_font(path)?,
        None => Annotator::new(),
    };
    let orchestrator = DetectionOrchestrator::new(
        &config,
        Arc::clone(&state),
        Arc::clone(&sensor),
        Box::new(detector),
        Arc::clone(&clock),
    )
    .with_annotator(annotator);

    let transport: Box<dyn Transport> = match &config.transport.frame_url {
        Some(url) => Box::new(HttpTransport::new(url.clone(), &config.transport)),
        None => Box::new(NullTransport::default()),
    };
    let source = DirectorySource::open(&args.frames, args.fps, args.loop_frames)?;

    let mut frame_loop = FrameLoop::new(
        Box::new(source),
        Box::new(BasicPreprocessor::new(&config.preprocessing)),
        orchestrator,
        transport,
        Arc::clone(&recorder),
    );

    let control = ControlApi::new(
        Arc::clone(&state),
        sensor,
        Arc::clone(&recorder),
        Arc::clone(&clock),
        &config.control.password,
    );
    spawn_control(control)?;

    // SIGINT / SIGTERM: 置位停止标志, 帧循环正常退出后由 _shutdown 复位执行器
    let stop = frame_loop.stop_handle();
    ctrlc::set_handler(move || {
        info!("🛑 收到停止信号, 等待当前帧处理完毕");
        stop.store(true, Ordering::SeqCst);
    })
    .context("failed to install signal handler")?;

    let stats = frame_loop.run()?;
    info!("📊 共处理 {} 帧", stats.frames);

    if let Some(presence) = &presence {
        match presence.set_online(false) {
            Ok(()) => info!("🔴 节点 {} 已下线", config.node.node_id),
            Err(e) => warn!("⚠️ 节点下线上报失败: {}", e),
        }
    }
    Ok(())
}

/// stdin 控制通道 (后台线程, 进程退出时随之结束)
fn spawn_control(control: ControlApi) -> Result<()> {
    std::thread::Builder::new()
        .name("control".into())
        .spawn(move || {
            let stdin = io::stdin();
            let mut stdout = io::stdout();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => line,
                    Err(e) => {
                        warn!("⚠️ 控制通道读取失败: {}", e);
                        break;
                    }
                };
                let reply = control.handle_json(&line);
                if writeln!(stdout, "{}", reply).and_then(|_| stdout.flush()).is_err() {
                    break;
                }
            }
            info!("🛑 控制通道关闭");
        })
        .context("failed to spawn control thread")?;
    Ok(())
}
