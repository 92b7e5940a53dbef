//! 命令 / 状态寄存器结构体定义
//!
//! 命令寄存器（机器人输出）与状态寄存器（机器人输入）都是定长字节映像，
//! 低位字节携带动作 / 模式 / 选项位，后续字节按固定轴顺序
//! （指 A、指 B、指 C、剪切轴）携带每轴三元组。
//!
//! 本模块只负责字节布局；何时编码、何时发送由驱动层决定。

use crate::ProtocolError;
use smallvec::SmallVec;

// ============================================================================
// 字节布局常量
// ============================================================================

/// 动作请求字节（byte 0）位定义
pub const RACT_BIT: u8 = 1 << 0;
pub const RMOD_SHIFT: u8 = 1;
pub const RMOD_MASK: u8 = 0b11 << 1;
pub const RGTO_BIT: u8 = 1 << 3;
pub const RATR_BIT: u8 = 1 << 4;

/// 选项字节（byte 1）位定义
pub const RICF_BIT: u8 = 1 << 2;
pub const RICS_BIT: u8 = 1 << 3;

/// 命令寄存器映像长度：不含剪切轴 / 含剪切轴（补齐到 16 位寄存器边界）
pub const COMMAND_IMAGE_LEN: usize = 12;
pub const COMMAND_IMAGE_LEN_SCISSOR: usize = 16;

/// 状态寄存器映像长度（定长）
pub const STATUS_IMAGE_LEN: usize = 16;

// ============================================================================
// 轴与字段枚举
// ============================================================================

/// 运动轴，固定编码顺序 A → B → C → Scissor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Axis {
    FingerA = 0,
    FingerB = 1,
    FingerC = 2,
    Scissor = 3,
}

impl Axis {
    /// 全部轴，按线缆上的编码顺序
    pub const ALL: [Axis; 4] = [Axis::FingerA, Axis::FingerB, Axis::FingerC, Axis::Scissor];

    /// 三根手指（剪切轴除外）
    pub const FINGERS: [Axis; 3] = [Axis::FingerA, Axis::FingerB, Axis::FingerC];
}

/// 抓取模式（rMOD / gMOD，2 bit）
///
/// 决定三指的几何构型：基本 / 内撑捏取 / 宽张 / 剪切。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum GraspMode {
    #[default]
    Basic = 0b00,
    Pinch = 0b01,
    Wide = 0b10,
    Scissor = 0b11,
}

impl GraspMode {
    /// 从 2 bit 字段值构造（调用方负责掩码）
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => GraspMode::Basic,
            0b01 => GraspMode::Pinch,
            0b10 => GraspMode::Wide,
            _ => GraspMode::Scissor,
        }
    }

    /// 该模式下指尖行程的位置上限
    ///
    /// 捏取模式受机械干涉限制，行程只有 0x71；其余模式全行程。
    pub fn position_span(&self) -> u8 {
        match self {
            GraspMode::Pinch => 0x71,
            _ => 0xFF,
        }
    }
}

impl TryFrom<u8> for GraspMode {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > 0b11 {
            return Err(ProtocolError::InvalidValue {
                field: "GraspMode",
                value,
            });
        }
        Ok(GraspMode::from_bits(value))
    }
}

/// 初始化状态（gIMC，2 bit）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InitStatus {
    /// 复位状态（未激活）
    #[default]
    Reset = 0b00,
    /// 激活进行中
    Activating = 0b01,
    /// 模式切换进行中
    ModeChanging = 0b10,
    /// 激活与模式切换均已完成
    Complete = 0b11,
}

impl InitStatus {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => InitStatus::Reset,
            0b01 => InitStatus::Activating,
            0b10 => InitStatus::ModeChanging,
            _ => InitStatus::Complete,
        }
    }

    /// 激活或模式切换是否仍在进行
    pub fn in_progress(&self) -> bool {
        matches!(self, InitStatus::Activating | InitStatus::ModeChanging)
    }
}

/// 整体运动状态（gSTA，2 bit）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MotionStatus {
    /// 夹爪整体仍在向目标运动
    #[default]
    Moving = 0b00,
    /// 一到两根手指提前停止
    PartialStop = 0b01,
    /// 全部手指在到达目标前停止
    StoppedShort = 0b10,
    /// 全部手指到达请求位置
    AtRequested = 0b11,
}

impl MotionStatus {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => MotionStatus::Moving,
            0b01 => MotionStatus::PartialStop,
            0b10 => MotionStatus::StoppedShort,
            _ => MotionStatus::AtRequested,
        }
    }
}

/// 单轴物体检测状态（gDTx，2 bit）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectStatus {
    /// 向请求位置运动中，未检测到物体
    #[default]
    InMotion = 0b00,
    /// 张开过程中接触停止（撑住物体）
    StoppedOpening = 0b01,
    /// 闭合过程中接触停止（夹住物体）
    StoppedClosing = 0b10,
    /// 到达请求位置，无物体或物体已脱落
    AtTarget = 0b11,
}

impl ObjectStatus {
    pub(crate) fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => ObjectStatus::InMotion,
            0b01 => ObjectStatus::StoppedOpening,
            0b10 => ObjectStatus::StoppedClosing,
            _ => ObjectStatus::AtTarget,
        }
    }

    /// 是否因接触物体而停止
    pub fn detected_object(&self) -> bool {
        matches!(self, ObjectStatus::StoppedOpening | ObjectStatus::StoppedClosing)
    }

    /// 该轴是否已经停定（到位或检测到物体）
    pub fn settled(&self) -> bool {
        !matches!(self, ObjectStatus::InMotion)
    }
}

/// 故障码（gFLT）
///
/// 0x00 表示无故障。表项来自厂商手册的通用故障表；
/// 未列出的码值通过 `Unknown` 兜底解析，不会使整帧解析失败。
#[derive(Debug, Clone, Copy, PartialEq, Eq, num_enum::FromPrimitive, num_enum::IntoPrimitive)]
#[repr(u8)]
pub enum FaultCode {
    NoFault = 0x00,
    /// 动作被延迟：需等待激活 / 模式切换完成
    ActionDelayed = 0x05,
    /// 动作前必须先置位激活位
    ActivationRequired = 0x07,
    /// 内部温度超限
    OverTemperature = 0x08,
    /// 通信看门狗超时（至少 1 秒无通信）
    CommTimeout = 0x09,
    /// 供电电压低于下限
    UnderVoltage = 0x0A,
    /// 自动释放进行中
    AutoReleaseInProgress = 0x0B,
    /// 内部故障
    InternalFault = 0x0C,
    /// 激活故障
    ActivationFault = 0x0D,
    /// 模式切换故障
    ModeFault = 0x0E,
    /// 自动释放完成（需重新激活）
    AutoReleaseCompleted = 0x0F,
    #[num_enum(catch_all)]
    Unknown(u8),
}

// num_enum 的 catch_all 与 default 属性互斥，Default 只能手写
impl Default for FaultCode {
    fn default() -> Self {
        FaultCode::NoFault
    }
}

impl FaultCode {
    /// 是否存在故障
    pub fn is_fault(&self) -> bool {
        !matches!(self, FaultCode::NoFault)
    }

    /// 重大故障：必须走显式复位流程（去激活后再激活）才能恢复
    pub fn requires_reset(&self) -> bool {
        u8::from(*self) >= 0x0A
    }
}

// ============================================================================
// 命令寄存器
// ============================================================================

/// 单轴目标三元组（位置 / 速度 / 力），各 8 bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisTarget {
    pub position: u8,
    pub speed: u8,
    pub force: u8,
}

/// 可单独置位的命令寄存器离散位
///
/// 供通用机器人接口的数字输出映射使用，索引即 DO 通道号。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionBit {
    Activate = 0,
    GoTo = 1,
    AutoRelease = 2,
    IndividualFinger = 3,
    IndividualScissor = 4,
}

impl TryFrom<u8> for ActionBit {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ActionBit::Activate),
            1 => Ok(ActionBit::GoTo),
            2 => Ok(ActionBit::AutoRelease),
            3 => Ok(ActionBit::IndividualFinger),
            4 => Ok(ActionBit::IndividualScissor),
            _ => Err(ProtocolError::InvalidValue {
                field: "ActionBit",
                value,
            }),
        }
    }
}

/// 命令寄存器（机器人输出映像）
///
/// 以具名字段暂存目标状态，`encode()` 时才打包为字节映像：
///
/// - byte 0：动作请求（rACT / rMOD / rGTO / rATR）
/// - byte 1：选项（rICF / rICS）
/// - byte 2：保留
/// - byte 3 起：每轴（位置, 速度, 力）三元组，轴顺序 A、B、C、剪切
///
/// 剪切轴字节只在 rICS 置位时编入；整个映像补齐到偶数长度，
/// 以便直接映射为 16 位保持寄存器。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CommandRegister {
    pub activate: bool,
    pub mode: GraspMode,
    pub go_to: bool,
    pub auto_release: bool,
    pub individual_finger: bool,
    pub individual_scissor: bool,
    pub targets: [AxisTarget; 4],
}

impl CommandRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// 暂存目标位置，越界输入饱和到 [0, 255] 而非回绕
    pub fn set_position(&mut self, axis: Axis, raw: i32) {
        self.targets[axis as usize].position = saturate(raw);
    }

    /// 暂存目标速度（饱和语义同位置）
    pub fn set_speed(&mut self, axis: Axis, raw: i32) {
        self.targets[axis as usize].speed = saturate(raw);
    }

    /// 暂存目标力（饱和语义同位置）
    pub fn set_force(&mut self, axis: Axis, raw: i32) {
        self.targets[axis as usize].force = saturate(raw);
    }

    pub fn target(&self, axis: Axis) -> AxisTarget {
        self.targets[axis as usize]
    }

    /// 按离散输出通道置位 / 清位
    pub fn set_bit(&mut self, bit: ActionBit, value: bool) {
        match bit {
            ActionBit::Activate => self.activate = value,
            ActionBit::GoTo => self.go_to = value,
            ActionBit::AutoRelease => self.auto_release = value,
            ActionBit::IndividualFinger => self.individual_finger = value,
            ActionBit::IndividualScissor => self.individual_scissor = value,
        }
    }

    pub fn bit(&self, bit: ActionBit) -> bool {
        match bit {
            ActionBit::Activate => self.activate,
            ActionBit::GoTo => self.go_to,
            ActionBit::AutoRelease => self.auto_release,
            ActionBit::IndividualFinger => self.individual_finger,
            ActionBit::IndividualScissor => self.individual_scissor,
        }
    }

    /// 当前配置下参与运动判定的轴集合
    ///
    /// 三根手指总是参与；剪切轴只在 rICS 置位时参与。
    pub fn enabled_axes(&self) -> &'static [Axis] {
        if self.individual_scissor {
            &Axis::ALL
        } else {
            &Axis::FINGERS
        }
    }

    /// 打包为寄存器字节映像
    ///
    /// 返回 12 字节（无剪切轴）或 16 字节（含剪切轴 + 补齐字节）。
    pub fn encode(&self) -> SmallVec<[u8; COMMAND_IMAGE_LEN_SCISSOR]> {
        let mut image = SmallVec::new();

        let mut action = (self.mode as u8) << RMOD_SHIFT;
        if self.activate {
            action |= RACT_BIT;
        }
        if self.go_to {
            action |= RGTO_BIT;
        }
        if self.auto_release {
            action |= RATR_BIT;
        }

        let mut options = 0u8;
        if self.individual_finger {
            options |= RICF_BIT;
        }
        if self.individual_scissor {
            options |= RICS_BIT;
        }

        image.push(action);
        image.push(options);
        image.push(0); // 保留字节

        for axis in Axis::FINGERS {
            let t = self.targets[axis as usize];
            image.push(t.position);
            image.push(t.speed);
            image.push(t.force);
        }

        if self.individual_scissor {
            let t = self.targets[Axis::Scissor as usize];
            image.push(t.position);
            image.push(t.speed);
            image.push(t.force);
            image.push(0); // 补齐到寄存器边界
        }

        image
    }
}

fn saturate(raw: i32) -> u8 {
    raw.clamp(0, 255) as u8
}

// ============================================================================
// 状态寄存器
// ============================================================================

/// 单轴反馈三元组：请求位置回显 / 当前位置 / 电机电流
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisFeedback {
    pub requested: u8,
    pub position: u8,
    pub current: u8,
}

/// 状态寄存器（机器人输入映像，解码后）
///
/// 定长 16 字节：
///
/// - byte 0：gACT / gMOD / gGTO / gIMC / gSTA
/// - byte 1..=12：每轴（回显, 位置, 电流）三元组，轴顺序 A、B、C、剪切
/// - byte 13：每轴物体检测标志（gDTA / gDTB / gDTC / gDTS，各 2 bit）
/// - byte 14：故障码 gFLT
/// - byte 15：保留
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatusRegister {
    pub activated: bool,
    pub mode: GraspMode,
    pub go_to: bool,
    pub init: InitStatus,
    pub motion: MotionStatus,
    pub axes: [AxisFeedback; 4],
    pub detection: [ObjectStatus; 4],
    pub fault: FaultCode,
}

impl StatusRegister {
    /// 从寄存器字节映像解析
    ///
    /// 防御式解码：长度不足直接拒绝，不产生部分结果。
    pub fn decode(image: &[u8]) -> Result<Self, ProtocolError> {
        if image.len() < STATUS_IMAGE_LEN {
            return Err(ProtocolError::InvalidLength {
                expected: STATUS_IMAGE_LEN,
                actual: image.len(),
            });
        }

        let header = image[0];

        let mut axes = [AxisFeedback::default(); 4];
        for (i, feedback) in axes.iter_mut().enumerate() {
            let base = 1 + i * 3;
            *feedback = AxisFeedback {
                requested: image[base],
                position: image[base + 1],
                current: image[base + 2],
            };
        }

        let det = image[13];
        let detection = [
            ObjectStatus::from_bits(det),
            ObjectStatus::from_bits(det >> 2),
            ObjectStatus::from_bits(det >> 4),
            ObjectStatus::from_bits(det >> 6),
        ];

        Ok(StatusRegister {
            activated: header & RACT_BIT != 0,
            mode: GraspMode::from_bits(header >> RMOD_SHIFT),
            go_to: header & RGTO_BIT != 0,
            init: InitStatus::from_bits(header >> 4),
            motion: MotionStatus::from_bits(header >> 6),
            axes,
            detection,
            fault: FaultCode::from(image[14]),
        })
    }

    pub fn axis(&self, axis: Axis) -> AxisFeedback {
        self.axes[axis as usize]
    }

    pub fn detection(&self, axis: Axis) -> ObjectStatus {
        self.detection[axis as usize]
    }
}

/// 状态映像的测试 / 仿真构建辅助
///
/// 与 `StatusRegister::decode` 互逆，驱动层测试与 Mock 设备共用。
pub fn build_status_image(status: &StatusRegister) -> [u8; STATUS_IMAGE_LEN] {
    let mut image = [0u8; STATUS_IMAGE_LEN];

    let mut header = (status.mode as u8) << RMOD_SHIFT;
    if status.activated {
        header |= RACT_BIT;
    }
    if status.go_to {
        header |= RGTO_BIT;
    }
    header |= (status.init as u8) << 4;
    header |= (status.motion as u8) << 6;
    image[0] = header;

    for (i, feedback) in status.axes.iter().enumerate() {
        let base = 1 + i * 3;
        image[base] = feedback.requested;
        image[base + 1] = feedback.position;
        image[base + 2] = feedback.current;
    }

    image[13] = (status.detection[0] as u8)
        | (status.detection[1] as u8) << 2
        | (status.detection[2] as u8) << 4
        | (status.detection[3] as u8) << 6;
    image[14] = u8::from(status.fault);

    image
}
