//! `info`: devices and kernel providers.

use anyhow::Result;
use console::style;
use qsoftmax_common::{DType, Device};
use qsoftmax_kernels::kernel_manager;
use qsoftmax_runtime::{ContextOptions, ExecutionContext};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct DeviceStatus {
    pub device: String,
    pub available: bool,
}

#[derive(Debug, Serialize)]
pub struct SystemInfo {
    pub version: &'static str,
    pub os: &'static str,
    pub arch: &'static str,
    pub cpu_cores: usize,
    pub devices: Vec<DeviceStatus>,
    pub kernels: Vec<&'static str>,
    pub selected_kernel: Option<&'static str>,
    pub dtypes: Vec<&'static str>,
}

/// Probe devices by creating a context on each, and list kernel providers.
pub fn collect() -> SystemInfo {
    let devices = [Device::Cpu, Device::Cuda(0)]
        .into_iter()
        .map(|device| DeviceStatus {
            device: device.to_string(),
            available: ExecutionContext::new(device, ContextOptions::default()).is_ok(),
        })
        .collect();

    let manager = kernel_manager();
    let selected_kernel = manager.select_best().ok().map(|p| p.name());

    SystemInfo {
        version: env!("CARGO_PKG_VERSION"),
        os: std::env::consts::OS,
        arch: std::env::consts::ARCH,
        cpu_cores: num_cpus::get(),
        devices,
        kernels: manager.list_available_providers(),
        selected_kernel,
        dtypes: DType::ALL.iter().map(|d| d.as_str()).collect(),
    }
}

pub fn render(info: &SystemInfo) -> String {
    let mark = |ok: bool| if ok { style("✓").green() } else { style("✗").red() };
    let mut out = vec![
        style("qsoftmax System Information").bold().cyan().to_string(),
        String::new(),
        style("System:").bold().to_string(),
        format!("  Version: {}", info.version),
        format!("  OS: {} ({})", info.os, info.arch),
        format!("  CPU cores: {}", info.cpu_cores),
        String::new(),
        style("Devices:").bold().to_string(),
    ];
    for d in &info.devices {
        out.push(format!("  {}: {}", d.device, mark(d.available)));
    }
    out.push(String::new());
    out.push(style("Kernel providers:").bold().to_string());
    for k in &info.kernels {
        let selected = if info.selected_kernel == Some(*k) { " (selected)" } else { "" };
        out.push(format!("  {k}{selected}"));
    }
    out.push(String::new());
    out.push(format!("{} {}", style("Data types:").bold(), info.dtypes.join(", ")));
    out.join("\n")
}

pub fn execute(format: crate::output::OutputFormat) -> Result<()> {
    crate::output::emit(format, &collect(), render)
}
