//! 夹爪会话对象与保活线程
//!
//! `Gripper` 是上层唯一的操作入口：前台操作与后台保活线程共享
//! 同一把互斥锁，锁覆盖"编码 → 发送 → 等应答 → 解析 → 更新缓存"的
//! 完整周期，保证任何观察者看到的命令映像与状态缓存都来自完整的
//! 链路往返，不存在半成品寄存器上线。
//!
//! 只读访问走 `ArcSwap` 快照，不与链路周期竞争锁。

use arc_swap::ArcSwap;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use std::mem::ManuallyDrop;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};
use triq_protocol::{ActionBit, Axis, GraspMode, StatusRegister};
use triq_transport::Transport;

use crate::config::GripProfile;
use crate::error::DriverError;
use crate::link::Link;
use crate::session::{GripPhase, SessionState};

/// 等待类操作的内部轮询间隔
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

/// 锁内共享的会话内核
struct Shared {
    transport: Box<dyn Transport + Send>,
    link: Link,
    session: SessionState,
}

impl Shared {
    /// 一个完整的链路周期：下发命令、轮询状态、更新缓存
    ///
    /// 发送或解析失败时缓存保持不变，调用方读到的仍是
    /// 最后一次已知良好的状态。
    fn exchange(&mut self, view: &ArcSwap<GripperView>) -> Result<(), DriverError> {
        self.link.transmit(self.transport.as_mut(), &self.session.command)?;
        let status = self.link.poll(self.transport.as_mut())?;
        self.session.apply_status(status);
        view.store(Arc::new(GripperView::from(&self.session)));
        Ok(())
    }

    /// 链路周期 + 故障上报：状态解码到非零 gFLT 时按失败返回
    ///
    /// 去激活 / 复位走不检查故障的 `exchange`，否则故障态永远无法离开。
    fn exchange_checked(&mut self, view: &ArcSwap<GripperView>) -> Result<(), DriverError> {
        self.exchange(view)?;
        if let GripPhase::Faulted(code) = self.session.phase {
            return Err(DriverError::Fault(code));
        }
        Ok(())
    }

    fn publish(&self, view: &ArcSwap<GripperView>) {
        view.store(Arc::new(GripperView::from(&self.session)));
    }
}

/// 会话状态的只读快照
#[derive(Debug, Clone, Default)]
pub struct GripperView {
    pub phase: GripPhase,
    pub status: StatusRegister,
    pub grasped_on_open: bool,
    pub grasped_on_close: bool,
    pub all_fingers_at_position: bool,
}

impl From<&SessionState> for GripperView {
    fn from(session: &SessionState) -> Self {
        Self {
            phase: session.phase,
            status: session.status,
            grasped_on_open: session.grasped_on_open,
            grasped_on_close: session.grasped_on_close,
            all_fingers_at_position: session.all_fingers_at_position,
        }
    }
}

/// 夹爪会话对象
///
/// 构造即启动保活线程；drop 时先关闭停止信号发送端再 join，
/// 线程退出后会话才算析构完成。
pub struct Gripper {
    shared: Arc<Mutex<Shared>>,
    view: Arc<ArcSwap<GripperView>>,
    profile: GripProfile,
    stop_tx: ManuallyDrop<Sender<()>>,
    keepalive: Option<JoinHandle<()>>,
}

impl Gripper {
    /// 在已建立的传输上打开会话
    ///
    /// 暂存配置给定的默认模式、速度与力；不向设备发送任何帧，
    /// 首帧由激活操作或保活周期触发。
    pub fn connect(
        transport: impl Transport + Send + 'static,
        profile: GripProfile,
    ) -> Result<Self, DriverError> {
        let mut session = SessionState::new();
        session.command.mode = profile.mode;
        for axis in Axis::ALL {
            session.command.set_speed(axis, profile.speed as i32);
            session.command.set_force(axis, profile.force as i32);
        }

        let shared = Arc::new(Mutex::new(Shared {
            transport: Box::new(transport),
            link: Link::new(profile.link_settings()),
            session,
        }));
        let view = Arc::new(ArcSwap::from_pointee(GripperView::default()));

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let keepalive = {
            let shared = shared.clone();
            let view = view.clone();
            let period = profile.keepalive_period();
            std::thread::Builder::new()
                .name("triq-keepalive".to_string())
                .spawn(move || keepalive_loop(shared, view, stop_rx, period))
                .map_err(|e| DriverError::Transport(e.into()))?
        };

        info!(profile = %profile.name, "Gripper session opened");
        Ok(Self {
            shared,
            view,
            profile,
            stop_tx: ManuallyDrop::new(stop_tx),
            keepalive: Some(keepalive),
        })
    }

    // ========================================================================
    // 状态访问
    // ========================================================================

    /// 最近一次成功轮询得到的会话快照（无锁）
    pub fn view(&self) -> Arc<GripperView> {
        self.view.load_full()
    }

    pub fn phase(&self) -> GripPhase {
        self.view.load().phase
    }

    pub fn profile(&self) -> &GripProfile {
        &self.profile
    }

    /// 前台发起一次完整链路周期，返回最新阶段
    pub fn refresh(&self) -> Result<GripPhase, DriverError> {
        let mut shared = self.shared.lock();
        shared.exchange(&self.view)?;
        Ok(shared.session.phase)
    }

    // ========================================================================
    // 生命周期操作
    // ========================================================================

    /// 置位激活并下发
    ///
    /// 激活在设备侧是异步过程，本操作在写应答后即返回；
    /// 用 `wait_active` 等待激活完成。
    pub fn activate(&self) -> Result<(), DriverError> {
        let mut shared = self.shared.lock();
        shared.session.command.activate = true;
        shared.exchange(&self.view)?;
        // 状态回读可能尚未反映激活进度，本地先行进入激活阶段
        if shared.session.phase == GripPhase::Uninitialized {
            shared.session.phase = GripPhase::Activating;
            shared.publish(&self.view);
        }
        debug!("Activation requested");
        Ok(())
    }

    /// 等待激活 / 模式切换完成
    pub fn wait_active(&self, timeout: Duration) -> Result<(), DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.phase() {
                GripPhase::Faulted(code) => return Err(DriverError::Fault(code)),
                GripPhase::Uninitialized | GripPhase::Activating => {},
                _ => return Ok(()),
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// 去激活：清除激活 / 运动 / 自动释放位并下发
    pub fn deactivate(&self) -> Result<(), DriverError> {
        let mut shared = self.shared.lock();
        shared.session.command.activate = false;
        shared.session.command.go_to = false;
        shared.session.command.auto_release = false;
        shared.exchange(&self.view)?;
        debug!("Deactivation requested");
        Ok(())
    }

    /// 复位流程：去激活后重新激活
    ///
    /// 重大故障（以及自动释放完成后）唯一的恢复路径。
    pub fn reset(&self) -> Result<(), DriverError> {
        info!("Resetting gripper");
        self.deactivate()?;
        self.activate()
    }

    // ========================================================================
    // 目标暂存与运动
    // ========================================================================

    /// 切换抓取模式并下发
    ///
    /// 模式切换会触发设备侧重新定位手指，完成前 gIMC 处于切换中。
    pub fn set_mode(&self, mode: GraspMode) -> Result<(), DriverError> {
        let mut shared = self.shared.lock();
        shared.session.command.mode = mode;
        shared.exchange_checked(&self.view)
    }

    /// 当前暂存的抓取模式（命令侧，可能尚未被状态回显确认）
    pub fn mode(&self) -> GraspMode {
        self.shared.lock().session.command.mode
    }

    /// 暂存单轴目标位置（不触发发送）
    pub fn set_position(&self, axis: Axis, raw: i32) {
        self.shared.lock().session.command.set_position(axis, raw);
    }

    /// 暂存单轴目标速度（不触发发送）
    pub fn set_speed(&self, axis: Axis, raw: i32) {
        self.shared.lock().session.command.set_speed(axis, raw);
    }

    /// 暂存单轴目标力（不触发发送）
    pub fn set_force(&self, axis: Axis, raw: i32) {
        self.shared.lock().session.command.set_force(axis, raw);
    }

    /// 一次性暂存三指统一目标（原子：单个锁窗口内完成）
    ///
    /// `speed` / `force` 传 `None` 保留当前暂存值。
    pub fn set_targets(&self, position: i32, speed: Option<i32>, force: Option<i32>) {
        let mut shared = self.shared.lock();
        for axis in Axis::FINGERS {
            shared.session.command.set_position(axis, position);
            if let Some(speed) = speed {
                shared.session.command.set_speed(axis, speed);
            }
            if let Some(force) = force {
                shared.session.command.set_force(axis, force);
            }
        }
    }

    /// 置位 rGTO 下发运动请求
    ///
    /// 未激活时拒绝；设备处于故障时按故障失败返回。
    /// 运动在设备侧异步执行，用 `wait_settled` 等待结论。
    pub fn go(&self) -> Result<(), DriverError> {
        let mut shared = self.shared.lock();
        match shared.session.phase {
            GripPhase::Uninitialized | GripPhase::Activating => {
                return Err(DriverError::NotActivated);
            },
            GripPhase::Faulted(code) => return Err(DriverError::Fault(code)),
            _ => {},
        }
        shared.session.command.go_to = true;
        shared.exchange_checked(&self.view)
    }

    /// 等待运动有结论（到位 / 抓住 / 卡滞），返回结论阶段
    pub fn wait_settled(&self, timeout: Duration) -> Result<GripPhase, DriverError> {
        let deadline = Instant::now() + timeout;
        loop {
            let phase = self.phase();
            match phase {
                GripPhase::Faulted(code) => return Err(DriverError::Fault(code)),
                _ if phase.settled() => return Ok(phase),
                _ => {},
            }
            if Instant::now() >= deadline {
                return Err(DriverError::Timeout);
            }
            std::thread::sleep(WAIT_POLL_INTERVAL);
        }
    }

    /// 清除 rGTO：停止当前运动，手指保持原位
    pub fn stop(&self) -> Result<(), DriverError> {
        let mut shared = self.shared.lock();
        shared.session.command.go_to = false;
        shared.exchange_checked(&self.view)
    }

    /// 置位 rATR 触发自动释放（紧急张开）
    ///
    /// 与运动请求无关，独立生效；完成后设备需要复位流程恢复。
    pub fn auto_release(&self) -> Result<(), DriverError> {
        warn!("Auto-release triggered");
        let mut shared = self.shared.lock();
        shared.session.command.auto_release = true;
        shared.exchange_checked(&self.view)
    }

    // ========================================================================
    // 控制选项
    // ========================================================================

    /// 开关各指独立控制（rICF），仅暂存
    pub fn set_individual_finger(&self, enabled: bool) {
        self.shared.lock().session.command.individual_finger = enabled;
    }

    /// 开关剪切轴独立控制（rICS），仅暂存
    ///
    /// 置位后剪切轴目标编入命令映像并参与运动判定。
    pub fn set_individual_scissor(&self, enabled: bool) {
        self.shared.lock().session.command.individual_scissor = enabled;
    }

    /// 回到剪切轴随动（自动对中）模式
    pub fn auto_center(&self) {
        self.set_individual_scissor(false);
    }

    /// 按离散输出通道写命令位并下发
    pub fn set_action_bit(&self, bit: ActionBit, value: bool) -> Result<(), DriverError> {
        let mut shared = self.shared.lock();
        shared.session.command.set_bit(bit, value);
        shared.exchange_checked(&self.view)
    }

    /// 读命令位（离散输出通道回读）
    pub fn action_bit(&self, bit: ActionBit) -> bool {
        self.shared.lock().session.command.bit(bit)
    }
}

impl Drop for Gripper {
    fn drop(&mut self) {
        // 先真正 drop 停止信号发送端，保活线程才能收到 Disconnected
        unsafe {
            ManuallyDrop::drop(&mut self.stop_tx);
        }
        if let Some(handle) = self.keepalive.take()
            && handle.join().is_err()
        {
            error!("Keepalive thread panicked during shutdown");
        }
        info!("Gripper session closed");
    }
}

/// 保活线程主循环
///
/// 每周期重发当前命令映像并轮询状态，喂住设备的通信看门狗。
/// 停止信号到达（或发送端被 drop）即退出；链路失败只记录日志，
/// 保留最后一次已知良好的缓存，下个周期继续尝试。
fn keepalive_loop(
    shared: Arc<Mutex<Shared>>,
    view: Arc<ArcSwap<GripperView>>,
    stop_rx: Receiver<()>,
    period: Duration,
) {
    debug!(?period, "Keepalive thread started");
    loop {
        match stop_rx.recv_timeout(period) {
            Err(RecvTimeoutError::Timeout) => {
                let mut shared = shared.lock();
                if let Err(e) = shared.exchange(&view) {
                    warn!("Keepalive cycle failed, keeping last known status: {}", e);
                } else {
                    trace!(phase = ?shared.session.phase, "Keepalive cycle completed");
                }
            },
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                debug!("Keepalive thread stopping");
                break;
            },
        }
    }
}
