//! 通用机器人接口到夹爪会话的适配层
//!
//! `Hand` 把跨设备族的机器人接口映射到夹爪会话操作：
//! 参数化操作走 `set_parameter`，工具开合走 `set_tool`，
//! 离散 I/O 走 `set_robot_do` / `get_robot_io`。
//! 机械臂专属接口（位姿 / 轨迹 / 力控）一律返回 `Unsupported`，
//! 不产生任何设备侧副作用。

use std::time::Duration;
use tracing::info;
use triq_driver::{GripPhase, Gripper, GripProfile};
use triq_protocol::{ActionBit, Axis, GraspMode};
use triq_transport::Transport;

use crate::error::ClientError;
use crate::types::{RobotAxes, RobotForces, RobotIo, RobotPose};

/// 参数化操作名
///
/// `set_parameter` 接受的操作集合，名字不区分大小写。
pub const PARAM_ACTIVATE: &str = "activate";
pub const PARAM_GRIP: &str = "grip";
pub const PARAM_MOVE: &str = "move";
pub const PARAM_AUTO_RELEASE: &str = "auto_release";
pub const PARAM_AUTO_CENTER: &str = "auto_center";
pub const PARAM_ADVANCED_CONTROL: &str = "advanced_control";
pub const PARAM_SCISSOR_CONTROL: &str = "scissor_control";

/// 夹爪设备句柄（通用机器人接口实现）
pub struct Hand {
    gripper: Gripper,
    /// 已耦合的工具配置名（仅用于日志标识）
    tool: Option<String>,
}

impl Hand {
    /// 在已建立的传输上打开夹爪会话
    pub fn connect(
        transport: impl Transport + Send + 'static,
        profile: GripProfile,
    ) -> Result<Self, ClientError> {
        Ok(Self {
            gripper: Gripper::connect(transport, profile)?,
            tool: None,
        })
    }

    /// 包装既有会话
    pub fn from_gripper(gripper: Gripper) -> Self {
        Self { gripper, tool: None }
    }

    /// 底层会话访问（等待 / 快照等细粒度控制）
    pub fn gripper(&self) -> &Gripper {
        &self.gripper
    }

    // ========================================================================
    // 夹爪语义接口
    // ========================================================================

    /// 执行参数化操作
    ///
    /// 未知操作名被拒绝且不发送任何帧。各操作的取值语义：
    ///
    /// - `activate`: 非零激活，零去激活
    /// - `grip`: 抓取模式编号（0 基本 / 1 捏取 / 2 宽张 / 3 剪切）
    /// - `move`: 非零下发运动，零停止
    /// - `auto_release`: 触发自动释放（取值忽略)
    /// - `auto_center`: 剪切轴回到随动模式（取值忽略）
    /// - `advanced_control`: 非零开启各指独立控制
    /// - `scissor_control`: 非零开启剪切轴独立控制
    pub fn set_parameter(&self, name: &str, value: i32) -> Result<(), ClientError> {
        if name.eq_ignore_ascii_case(PARAM_ACTIVATE) {
            if value != 0 {
                self.gripper.activate()?;
            } else {
                self.gripper.deactivate()?;
            }
        } else if name.eq_ignore_ascii_case(PARAM_GRIP) {
            let bits = u8::try_from(value)
                .ok()
                .filter(|v| *v <= 0b11)
                .ok_or_else(|| ClientError::Rejected(format!("invalid grasp mode: {value}")))?;
            let mode = GraspMode::try_from(bits)
                .map_err(|e| ClientError::Rejected(e.to_string()))?;
            self.gripper.set_mode(mode)?;
        } else if name.eq_ignore_ascii_case(PARAM_MOVE) {
            if value != 0 {
                self.gripper.go()?;
            } else {
                self.gripper.stop()?;
            }
        } else if name.eq_ignore_ascii_case(PARAM_AUTO_RELEASE) {
            self.gripper.auto_release()?;
        } else if name.eq_ignore_ascii_case(PARAM_AUTO_CENTER) {
            self.gripper.auto_center();
        } else if name.eq_ignore_ascii_case(PARAM_ADVANCED_CONTROL) {
            self.gripper.set_individual_finger(value != 0);
        } else if name.eq_ignore_ascii_case(PARAM_SCISSOR_CONTROL) {
            self.gripper.set_individual_scissor(value != 0);
        } else {
            return Err(ClientError::Rejected(format!("unknown parameter: {name}")));
        }
        Ok(())
    }

    /// 按开合比例闭合工具
    ///
    /// `fraction` 为 0.0（全开）到 1.0（全闭）的比例，越界截断。
    /// 行程上限按命令侧暂存的抓取模式换算：运动将以该模式下发，
    /// 刚切换模式、状态回显尚未跟上时也不会用旧模式的行程。
    pub fn set_tool(&self, fraction: f64) -> Result<(), ClientError> {
        let span = self.gripper.mode().position_span();
        let position = (fraction.clamp(0.0, 1.0) * span as f64).round() as i32;
        self.gripper.set_targets(position, None, None);
        self.gripper.go()?;
        Ok(())
    }

    /// 等待激活完成
    pub fn wait_active(&self, timeout: Duration) -> Result<(), ClientError> {
        Ok(self.gripper.wait_active(timeout)?)
    }

    /// 等待运动有结论，返回结论阶段
    pub fn wait_settled(&self, timeout: Duration) -> Result<GripPhase, ClientError> {
        Ok(self.gripper.wait_settled(timeout)?)
    }

    /// 停止当前运动（手指保持原位）
    pub fn stop_motion(&self) -> Result<(), ClientError> {
        Ok(self.gripper.stop()?)
    }

    /// 故障恢复：去激活后重新激活
    pub fn reset(&self) -> Result<(), ClientError> {
        Ok(self.gripper.reset()?)
    }

    /// 耦合工具配置（仅记录名字，夹爪无工具更换机构）
    pub fn couple(&mut self, tool_name: &str) -> Result<(), ClientError> {
        info!(tool = tool_name, "Tool coupled");
        self.tool = Some(tool_name.to_string());
        Ok(())
    }

    /// 透传一条操作员消息到日志
    pub fn message(&self, text: &str) -> Result<(), ClientError> {
        info!(tool = self.tool.as_deref().unwrap_or("-"), "{}", text);
        Ok(())
    }

    // ========================================================================
    // 轴与 I/O 读写
    // ========================================================================

    /// 读取四个运动轴的当前位置
    pub fn get_robot_axes(&self) -> Result<RobotAxes, ClientError> {
        let view = self.gripper.view();
        let mut axes = [0.0; 4];
        for (i, axis) in Axis::ALL.iter().enumerate() {
            axes[i] = view.status.axis(*axis).position as f64;
        }
        Ok(RobotAxes { axes })
    }

    /// 写离散输出通道（通道号映射命令寄存器离散位）
    pub fn set_robot_do(&self, channel: u8, value: bool) -> Result<(), ClientError> {
        let bit = ActionBit::try_from(channel)
            .map_err(|e| ClientError::Rejected(e.to_string()))?;
        Ok(self.gripper.set_action_bit(bit, value)?)
    }

    /// 读离散 I/O 映像
    pub fn get_robot_io(&self) -> Result<RobotIo, ClientError> {
        let view = self.gripper.view();
        let mut dout = [false; 5];
        for (i, slot) in dout.iter_mut().enumerate() {
            // 通道号在 ActionBit 定义域内，try_from 不会失败
            if let Ok(bit) = ActionBit::try_from(i as u8) {
                *slot = self.gripper.action_bit(bit);
            }
        }
        let mut din = [false; 4];
        for (i, axis) in Axis::ALL.iter().enumerate() {
            din[i] = view.status.detection(*axis).detected_object();
        }
        Ok(RobotIo {
            dout,
            din,
            fault: view.status.fault.is_fault(),
        })
    }

    // ========================================================================
    // 机械臂专属接口（夹爪不支持，一律拒绝）
    // ========================================================================

    pub fn apply_cartesian_force_torque(
        &self,
        _pose: &RobotPose,
        _forces: &RobotForces,
    ) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("apply_cartesian_force_torque"))
    }

    pub fn apply_joint_torque(&self, _torques: &RobotAxes) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("apply_joint_torque"))
    }

    pub fn move_to(&self, _pose: &RobotPose) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("move_to"))
    }

    pub fn move_straight_to(&self, _pose: &RobotPose) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("move_straight_to"))
    }

    pub fn move_through_to(&self, _poses: &[RobotPose]) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("move_through_to"))
    }

    pub fn move_to_axis_target(&self, _axes: &RobotAxes) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("move_to_axis_target"))
    }

    pub fn move_attractor(&self, _pose: &RobotPose) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("move_attractor"))
    }

    pub fn get_robot_pose(&self) -> Result<RobotPose, ClientError> {
        Err(ClientError::Unsupported("get_robot_pose"))
    }

    pub fn get_robot_forces(&self) -> Result<RobotForces, ClientError> {
        Err(ClientError::Unsupported("get_robot_forces"))
    }

    pub fn get_robot_torques(&self) -> Result<RobotAxes, ClientError> {
        Err(ClientError::Unsupported("get_robot_torques"))
    }

    pub fn get_robot_speed(&self) -> Result<RobotAxes, ClientError> {
        Err(ClientError::Unsupported("get_robot_speed"))
    }

    pub fn set_absolute_speed(&self, _speed: f64) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_absolute_speed"))
    }

    pub fn set_absolute_acceleration(&self, _accel: f64) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_absolute_acceleration"))
    }

    pub fn set_relative_speed(&self, _fraction: f64) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_relative_speed"))
    }

    pub fn set_relative_acceleration(&self, _fraction: f64) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_relative_acceleration"))
    }

    pub fn set_axial_speeds(&self, _speeds: &RobotAxes) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_axial_speeds"))
    }

    pub fn set_angle_units(&self, _units: &str) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_angle_units"))
    }

    pub fn set_length_units(&self, _units: &str) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_length_units"))
    }

    pub fn set_axial_units(&self, _units: &[&str]) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_axial_units"))
    }

    pub fn set_end_pose_tolerance(&self, _tolerance: &RobotPose) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_end_pose_tolerance"))
    }

    pub fn set_intermediate_pose_tolerance(
        &self,
        _tolerance: &RobotPose,
    ) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("set_intermediate_pose_tolerance"))
    }

    pub fn move_base(&self, _to: &RobotPose) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("move_base"))
    }

    pub fn point_head(&self, _at: &RobotPose) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("point_head"))
    }

    pub fn point_appendage(&self, _at: &RobotPose) -> Result<(), ClientError> {
        Err(ClientError::Unsupported("point_appendage"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triq_driver::DriverError;
    use triq_protocol::{InitStatus, StatusRegister, build_status_image};
    use triq_transport::mock::{MockHandle, MockTransport};

    fn fast_profile() -> GripProfile {
        GripProfile {
            keepalive_period_ms: 10,
            ack_timeout_ms: 50,
            response_timeout_ms: 50,
            ..GripProfile::default()
        }
    }

    fn active_idle_image() -> [u8; 16] {
        let mut status = StatusRegister::default();
        status.activated = true;
        status.init = InitStatus::Complete;
        build_status_image(&status)
    }

    fn connect_active() -> (Hand, MockHandle) {
        let (transport, handle) = MockTransport::new();
        let hand = Hand::connect(transport, fast_profile()).unwrap();
        handle.set_status_image(active_idle_image());
        hand.gripper().refresh().unwrap();
        (hand, handle)
    }

    #[test]
    fn test_set_parameter_activate_and_move() {
        let (hand, _handle) = connect_active();
        hand.set_parameter("activate", 1).unwrap();
        hand.set_parameter("MOVE", 1).unwrap();
        hand.set_parameter("move", 0).unwrap();
    }

    /// 未知参数名被拒绝，不发送任何帧
    #[test]
    fn test_unknown_parameter_rejected() {
        let (hand, handle) = connect_active();
        let before = handle.sent_count();
        let err = hand.set_parameter("warp_drive", 1).unwrap_err();
        assert!(err.is_rejection());
        assert_eq!(handle.sent_count(), before);
    }

    #[test]
    fn test_grip_parameter_selects_mode() {
        let (hand, handle) = connect_active();
        hand.set_parameter("grip", 1).unwrap();

        // 最后一个写请求的动作字节携带 rMOD=01
        let frames = handle.sent_frames();
        let last_write = frames
            .iter()
            .rev()
            .find(|f| f[7] == triq_protocol::FUNC_WRITE_REGISTERS)
            .unwrap();
        assert_eq!((last_write[13] >> 1) & 0b11, 0b01);

        let err = hand.set_parameter("grip", 9).unwrap_err();
        assert!(err.is_rejection());
    }

    /// 工具开合比例按模式行程换算，越界截断
    #[test]
    fn test_set_tool_scales_to_span() {
        let (hand, handle) = connect_active();
        hand.set_tool(1.5).unwrap();

        let frames = handle.sent_frames();
        let last_write = frames
            .iter()
            .rev()
            .find(|f| f[7] == triq_protocol::FUNC_WRITE_REGISTERS)
            .unwrap();
        // 基本模式全行程，1.5 截断为 1.0 → 0xFF
        assert_eq!(last_write[16], 0xFF);
    }

    /// 模式切换后立即开合：行程按暂存模式换算，不等状态回显
    #[test]
    fn test_set_tool_uses_staged_mode() {
        let (hand, handle) = connect_active();

        // 状态回显仍是基本模式，暂存模式已切到捏取
        hand.set_parameter("grip", 1).unwrap();
        hand.set_tool(1.0).unwrap();

        let frames = handle.sent_frames();
        let last_write = frames
            .iter()
            .rev()
            .find(|f| f[7] == triq_protocol::FUNC_WRITE_REGISTERS)
            .unwrap();
        // 捏取模式行程上限 0x71
        assert_eq!(last_write[16], 0x71);
    }

    /// 机械臂专属接口一律归为拒绝类结果
    #[test]
    fn test_arm_only_operations_rejected() {
        let (hand, _handle) = connect_active();
        let pose = RobotPose::default();

        let err = hand.move_to(&pose).unwrap_err();
        assert!(matches!(err, ClientError::Unsupported("move_to")));
        assert!(err.is_rejection());

        assert!(hand.get_robot_pose().unwrap_err().is_rejection());
        assert!(hand.set_absolute_speed(0.5).unwrap_err().is_rejection());
        assert!(hand.move_base(&pose).unwrap_err().is_rejection());
    }

    /// 链路失败归为"接受但执行失败"，不是拒绝
    #[test]
    fn test_transport_failure_is_not_rejection() {
        let (hand, handle) = connect_active();
        handle.set_silent(true);
        let err = hand.set_parameter("move", 1).unwrap_err();
        assert!(matches!(err, ClientError::Driver(DriverError::Transport(_))));
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_robot_io_roundtrip() {
        let (hand, _handle) = connect_active();
        hand.set_robot_do(3, true).unwrap();

        let io = hand.get_robot_io().unwrap();
        assert!(io.dout[3]);
        assert!(!io.fault);

        let err = hand.set_robot_do(9, true).unwrap_err();
        assert!(err.is_rejection());
    }

    #[test]
    fn test_get_robot_axes_reads_positions() {
        let (transport, handle) = MockTransport::new();
        let hand = Hand::connect(transport, fast_profile()).unwrap();

        let mut status = StatusRegister::default();
        status.activated = true;
        status.init = InitStatus::Complete;
        status.axes[0].position = 0x20;
        status.axes[2].position = 0x80;
        handle.set_status_image(build_status_image(&status));
        hand.gripper().refresh().unwrap();

        let axes = hand.get_robot_axes().unwrap();
        assert_eq!(axes.axes[0], 0x20 as f64);
        assert_eq!(axes.axes[2], 0x80 as f64);
    }
}
