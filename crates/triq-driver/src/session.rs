//! 会话状态缓存与抓取阶段机
//!
//! 会话持有最近一次成功编码的命令映像与最近一次成功解析的状态映像，
//! 并在每次状态更新后重算派生标志与抓取阶段。链路失败不触碰缓存：
//! 上层读到的永远是"最后一次已知良好"的设备视图。

use triq_protocol::{
    CommandRegister, FaultCode, InitStatus, MotionStatus, ObjectStatus, StatusRegister,
};

/// 抓取阶段
///
/// 由状态映像派生的粗粒度阶段机，供上层等待与决策使用。
/// `Faulted` 从任何阶段都可进入，且只有显式复位流程可以离开。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GripPhase {
    /// 未激活（上电初始 / 去激活后）
    #[default]
    Uninitialized,
    /// 激活或模式切换进行中
    Activating,
    /// 已激活，无运动请求在途
    Idle,
    /// 运动请求在途，手指尚未全部停定
    Moving,
    /// 全部使能轴到达请求位置，未接触物体
    AtTarget,
    /// 至少一个使能轴因接触物体停止
    Grasped,
    /// 全部手指在到达目标前停止，且未检测到物体
    Stalled,
    /// 设备上报故障
    Faulted(FaultCode),
}

impl GripPhase {
    /// 运动请求是否已有结论（到位 / 抓住 / 卡滞）
    pub fn settled(&self) -> bool {
        matches!(self, GripPhase::AtTarget | GripPhase::Grasped | GripPhase::Stalled)
    }

    /// 是否可以接受运动请求
    pub fn ready(&self) -> bool {
        !matches!(
            self,
            GripPhase::Uninitialized | GripPhase::Activating | GripPhase::Faulted(_)
        )
    }
}

/// 会话状态缓存
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// 暂存的命令寄存器（下一次发送的映像来源）
    pub command: CommandRegister,
    /// 最后一次成功解析的状态寄存器
    pub status: StatusRegister,
    /// 当前抓取阶段
    pub phase: GripPhase,
    /// 张开过程中撑住了物体
    pub grasped_on_open: bool,
    /// 闭合过程中夹住了物体
    pub grasped_on_close: bool,
    /// 全部使能轴已停定（到位或检测到物体）
    pub all_fingers_at_position: bool,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 吸收一帧新状态，重算派生标志与阶段
    ///
    /// 派生标志只统计当前使能的轴：三指总是参与，
    /// 剪切轴只在命令侧 rICS 置位时参与。
    pub fn apply_status(&mut self, status: StatusRegister) {
        self.status = status;

        let axes = self.command.enabled_axes();
        let all_settled = axes.iter().all(|a| status.detection(*a).settled());
        let any_detected = axes.iter().any(|a| status.detection(*a).detected_object());
        self.grasped_on_open = axes
            .iter()
            .any(|a| status.detection(*a) == ObjectStatus::StoppedOpening);
        self.grasped_on_close = axes
            .iter()
            .any(|a| status.detection(*a) == ObjectStatus::StoppedClosing);
        self.all_fingers_at_position = all_settled;

        self.phase = if status.fault.is_fault() {
            GripPhase::Faulted(status.fault)
        } else if !status.activated || status.init == InitStatus::Reset {
            GripPhase::Uninitialized
        } else if status.init.in_progress() {
            GripPhase::Activating
        } else if status.go_to {
            if !all_settled {
                GripPhase::Moving
            } else if any_detected {
                GripPhase::Grasped
            } else if status.motion == MotionStatus::StoppedShort {
                GripPhase::Stalled
            } else {
                GripPhase::AtTarget
            }
        } else {
            GripPhase::Idle
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triq_protocol::{GraspMode, build_status_image};

    fn status(f: impl FnOnce(&mut StatusRegister)) -> StatusRegister {
        let mut s = StatusRegister::default();
        f(&mut s);
        // 经过一次编码 / 解码，保证夹具与线上字节一致
        StatusRegister::decode(&build_status_image(&s)).unwrap()
    }

    #[test]
    fn test_phase_uninitialized_and_activating() {
        let mut session = SessionState::new();
        assert_eq!(session.phase, GripPhase::Uninitialized);

        session.apply_status(status(|s| {
            s.activated = true;
            s.init = InitStatus::Activating;
        }));
        assert_eq!(session.phase, GripPhase::Activating);
        assert!(!session.phase.ready());

        session.apply_status(status(|s| {
            s.activated = true;
            s.init = InitStatus::Complete;
        }));
        assert_eq!(session.phase, GripPhase::Idle);
        assert!(session.phase.ready());
    }

    #[test]
    fn test_phase_moving_then_at_target() {
        let mut session = SessionState::new();
        session.apply_status(status(|s| {
            s.activated = true;
            s.init = InitStatus::Complete;
            s.go_to = true;
            s.detection = [ObjectStatus::InMotion; 4];
        }));
        assert_eq!(session.phase, GripPhase::Moving);
        assert!(!session.all_fingers_at_position);

        session.apply_status(status(|s| {
            s.activated = true;
            s.init = InitStatus::Complete;
            s.go_to = true;
            s.motion = MotionStatus::AtRequested;
            s.detection = [ObjectStatus::AtTarget; 4];
        }));
        assert_eq!(session.phase, GripPhase::AtTarget);
        assert!(session.all_fingers_at_position);
        assert!(!session.grasped_on_close);
    }

    /// 闭合中任一指接触物体即视为抓住
    #[test]
    fn test_phase_grasped_on_close() {
        let mut session = SessionState::new();
        session.apply_status(status(|s| {
            s.activated = true;
            s.init = InitStatus::Complete;
            s.go_to = true;
            s.motion = MotionStatus::PartialStop;
            s.detection = [
                ObjectStatus::StoppedClosing,
                ObjectStatus::AtTarget,
                ObjectStatus::AtTarget,
                ObjectStatus::InMotion, // 剪切轴未使能，不参与判定
            ];
        }));
        assert_eq!(session.phase, GripPhase::Grasped);
        assert!(session.grasped_on_close);
        assert!(!session.grasped_on_open);
        assert!(session.all_fingers_at_position);
    }

    /// 剪切轴只在 rICS 置位时参与派生判定
    #[test]
    fn test_scissor_axis_gated_by_command() {
        let image = status(|s| {
            s.activated = true;
            s.init = InitStatus::Complete;
            s.go_to = true;
            s.detection = [
                ObjectStatus::AtTarget,
                ObjectStatus::AtTarget,
                ObjectStatus::AtTarget,
                ObjectStatus::InMotion,
            ];
        });

        let mut session = SessionState::new();
        session.apply_status(image);
        assert_eq!(session.phase, GripPhase::AtTarget);

        let mut session = SessionState::new();
        session.command.set_bit(triq_protocol::ActionBit::IndividualScissor, true);
        session.apply_status(image);
        assert_eq!(session.phase, GripPhase::Moving);
        assert!(!session.all_fingers_at_position);
    }

    #[test]
    fn test_phase_stalled() {
        let mut session = SessionState::new();
        session.apply_status(status(|s| {
            s.activated = true;
            s.init = InitStatus::Complete;
            s.go_to = true;
            s.motion = MotionStatus::StoppedShort;
            s.detection = [ObjectStatus::AtTarget; 4];
        }));
        assert_eq!(session.phase, GripPhase::Stalled);
    }

    /// 故障从任何阶段进入，且优先于其他判定
    #[test]
    fn test_phase_faulted_takes_priority() {
        let mut session = SessionState::new();
        session.apply_status(status(|s| {
            s.activated = true;
            s.init = InitStatus::Complete;
            s.go_to = true;
            s.mode = GraspMode::Wide;
            s.fault = FaultCode::UnderVoltage;
        }));
        assert_eq!(session.phase, GripPhase::Faulted(FaultCode::UnderVoltage));
        assert!(!session.phase.ready());
    }
}
