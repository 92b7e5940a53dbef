//! 通用机器人接口的数据类型
//!
//! 这些类型属于跨设备族的公共表面：位姿与六维力只对机械臂有意义，
//! 在夹爪设备上仅作为拒绝类接口的签名出现。

/// 笛卡尔位姿（机械臂语义，夹爪不支持）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RobotPose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub xrot: f64,
    pub yrot: f64,
    pub zrot: f64,
}

/// 六维力 / 力矩（机械臂语义，夹爪不支持）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RobotForces {
    pub fx: f64,
    pub fy: f64,
    pub fz: f64,
    pub tx: f64,
    pub ty: f64,
    pub tz: f64,
}

/// 轴位置反馈
///
/// 夹爪设备上映射为四个运动轴（指 A、指 B、指 C、剪切轴）
/// 的当前位置，原始计数 0..=255。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RobotAxes {
    pub axes: [f64; 4],
}

/// 离散 I/O 映像
///
/// 输出通道映射为命令寄存器的离散位（通道号即 `ActionBit`）；
/// 输入通道映射为每轴物体检测标志与故障标志。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RobotIo {
    /// 数字输出回读：激活 / 运动 / 自动释放 / 各指独立 / 剪切独立
    pub dout: [bool; 5],
    /// 数字输入：每轴物体检测（A、B、C、剪切）
    pub din: [bool; 4],
    /// 故障标志
    pub fault: bool,
}
