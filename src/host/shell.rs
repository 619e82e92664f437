use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use walkdir::{DirEntry, WalkDir};

use crate::control::error::{ControlError, Result};
use crate::control::types::{Attachment, AttachmentKind};
use crate::control::utils::metadata::MetadataConverter;

use super::{ActionOutcome, HostAction, HostActions, Priority, ProcessSummary, clip_output};

const SPEEDTEST_TIMEOUT: Duration = Duration::from_secs(120);
const TOP_FOLDERS: usize = 10;

/// Implementazione basata sui comandi della piattaforma.
pub struct ShellHost {
    timeout: Duration,
}

impl ShellHost {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, program: &str, args: &[&str]) -> Result<Output> {
        self.run_with(program, args, None, self.timeout).await
    }

    async fn run_with(
        &self,
        program: &str,
        args: &[&str],
        input: Option<&str>,
        limit: Duration,
    ) -> Result<Output> {
        info!("exec: {} {:?}", program, args);
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(if input.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| {
            ControlError::CollaboratorFailure(format!("cannot start {program}: {e}"))
        })?;
        if let (Some(text), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin
                .write_all(text.as_bytes())
                .await
                .map_err(|e| ControlError::CollaboratorFailure(format!("{program}: {e}")))?;
        }

        match tokio::time::timeout(limit, child.wait_with_output()).await {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(e)) => Err(ControlError::CollaboratorFailure(format!("{program}: {e}"))),
            Err(_) => {
                warn!("exec timed out: {} after {:?}", program, limit);
                Err(ControlError::Timeout(limit.as_secs()))
            }
        }
    }

    /// Esegue un comando e riassume l'esito in un messaggio.
    async fn simple(&self, program: &str, args: &[&str], done: &str) -> ActionOutcome {
        match self.run(program, args).await {
            Ok(output) if output.status.success() => ActionOutcome::ok(format!("✅ {done}")),
            Ok(output) => ActionOutcome::failed(format!("❌ {program} failed: {}", stderr_of(&output))),
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    /// Esegue un comando e ne mostra l'output.
    async fn report(&self, program: &str, args: &[&str], title: &str) -> ActionOutcome {
        match self.run(program, args).await {
            Ok(output) if output.status.success() => ActionOutcome::ok(format!(
                "{title}\n\n{}",
                clip_output(String::from_utf8_lossy(&output.stdout).trim())
            )),
            Ok(output) => ActionOutcome::failed(format!("❌ {program} failed: {}", stderr_of(&output))),
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn capture(
        &self,
        program: &str,
        args: &[&str],
        limit: Duration,
        attachment: (AttachmentKind, &str),
        caption: &str,
    ) -> ActionOutcome {
        match self.run_with(program, args, None, limit).await {
            Ok(output) if output.status.success() && !output.stdout.is_empty() => {
                ActionOutcome::ok(format!("✅ {caption}")).with_payload(Attachment {
                    kind: attachment.0,
                    name: attachment.1.to_string(),
                    bytes: output.stdout,
                })
            }
            Ok(output) => ActionOutcome::failed(format!("❌ {program} failed: {}", stderr_of(&output))),
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn execute(&self, command: &str) -> ActionOutcome {
        let result = if cfg!(windows) {
            self.run("cmd", &["/C", command]).await
        } else {
            self.run("sh", &["-c", command]).await
        };
        match result {
            Ok(output) => {
                let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
                text.push_str(&String::from_utf8_lossy(&output.stderr));
                let body = clip_output(text.trim_end());
                let message = format!("💻 CMD Output (exit {}):\n\n{}", exit_code(&output), body);
                if output.status.success() {
                    ActionOutcome::ok(message)
                } else {
                    ActionOutcome::failed(message)
                }
            }
            Err(ControlError::Timeout(secs)) => {
                ActionOutcome::failed(format!("❌ Command timeout ({secs}s)"))
            }
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn run_program(&self, path: &str) -> ActionOutcome {
        let path = path.trim().trim_matches('"');
        match Command::new(path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                let pid = child.id().map(|p| p.to_string()).unwrap_or_else(|| "?".into());
                info!("Process started: {} (PID: {})", path, pid);
                ActionOutcome::ok(format!("✅ Process started: {path} (PID: {pid})"))
            }
            Err(e) => {
                ActionOutcome::failed(ControlError::from_io(path, e).user_message())
            }
        }
    }

    async fn kill(&self, pid: u32) -> ActionOutcome {
        let pid_arg = pid.to_string();
        let result = if cfg!(windows) {
            self.run("taskkill", &["/F", "/PID", &pid_arg]).await
        } else {
            self.run("kill", &["-9", &pid_arg]).await
        };
        match result {
            Ok(output) if output.status.success() => {
                ActionOutcome::ok(format!("✅ Process (PID: {pid}) has been terminated."))
            }
            Ok(output) => ActionOutcome::failed(format!(
                "❌ Cannot terminate process {pid}: {}",
                stderr_of(&output)
            )),
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn restart(&self, pid: u32) -> ActionOutcome {
        if cfg!(windows) {
            return ActionOutcome::failed("❌ Restarting processes is not available on this host.");
        }
        let proc_dir = PathBuf::from(format!("/proc/{pid}"));
        let cmdline = match tokio::fs::read(proc_dir.join("cmdline")).await {
            Ok(raw) => split_cmdline(&raw),
            Err(_) => return ActionOutcome::failed(format!("❌ Process with PID {pid} not found.")),
        };
        let Some((program, args)) = cmdline.split_first() else {
            return ActionOutcome::failed(format!("❌ Process {pid} has no command line."));
        };
        let cwd = tokio::fs::read_link(proc_dir.join("cwd"))
            .await
            .unwrap_or_else(|_| PathBuf::from("/"));

        let killed = self.kill(pid).await;
        if !killed.success {
            return killed;
        }
        match Command::new(program)
            .args(args)
            .current_dir(&cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => ActionOutcome::ok(format!(
                "✅ Process '{program}' (PID: {pid}) has been restarted (new PID: {}).",
                child.id().unwrap_or_default()
            )),
            Err(e) => ActionOutcome::failed(format!("❌ Error restarting process {pid}: {e}")),
        }
    }

    async fn set_priority(&self, pid: u32, priority: Priority) -> ActionOutcome {
        let pid_arg = pid.to_string();
        let result = if cfg!(windows) {
            let class = match priority {
                Priority::Low => "16384",
                Priority::Normal => "32",
                Priority::High => "128",
                Priority::Realtime => "256",
            };
            let filter = format!("processid={pid}");
            self.run("wmic", &["process", "where", &filter, "CALL", "setpriority", class])
                .await
        } else {
            let nice = match priority {
                Priority::Low => "10",
                Priority::Normal => "0",
                Priority::High => "-10",
                Priority::Realtime => "-20",
            };
            self.run("renice", &["-n", nice, "-p", &pid_arg]).await
        };
        match result {
            Ok(output) if output.status.success() => ActionOutcome::ok(format!(
                "✅ Priority of PID {pid} changed to {priority}."
            )),
            Ok(output) => ActionOutcome::failed(format!(
                "❌ Cannot change priority of process {pid}: {}",
                stderr_of(&output)
            )),
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn process_info(&self, pid: u32) -> ActionOutcome {
        let pid_arg = pid.to_string();
        if cfg!(windows) {
            let filter = format!("PID eq {pid}");
            return self
                .report("tasklist", &["/FI", &filter, "/FO", "LIST", "/V"], "👁️ Process Info")
                .await;
        }
        match self
            .run("ps", &["-o", "pid=,stat=,rss=,pcpu=,user=,comm=", "-p", &pid_arg])
            .await
        {
            Ok(output) if output.status.success() => {
                let line = String::from_utf8_lossy(&output.stdout);
                let fields: Vec<&str> = line.split_whitespace().collect();
                if fields.len() < 6 {
                    return ActionOutcome::failed(format!("❌ Process {pid} not found."));
                }
                let ram_mb = fields[2].parse::<f64>().unwrap_or(0.0) / 1024.0;
                ActionOutcome::ok(format!(
                    "👁️ Process Info\n\nName: {}\nPID: {}\nStatus: {}\nRAM: {:.1} MB\nCPU: {}%\nUser: {}",
                    fields[5..].join(" "),
                    fields[0],
                    fields[1],
                    ram_mb,
                    fields[3],
                    fields[4]
                ))
            }
            Ok(_) => ActionOutcome::failed(format!("❌ Process {pid} not found.")),
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn ping(&self, host: &str) -> ActionOutcome {
        let host = host.trim();
        if !valid_host(host) {
            return ActionOutcome::failed(format!("❌ Invalid host: {host}"));
        }
        let count_flag = if cfg!(windows) { "-n" } else { "-c" };
        match self.run("ping", &[count_flag, "4", host]).await {
            Ok(output) => {
                let text = clip_output(String::from_utf8_lossy(&output.stdout).trim());
                if output.status.success() {
                    ActionOutcome::ok(format!("📡 Ping {host}:\n\n{text}"))
                } else {
                    ActionOutcome::failed(format!("❌ Host {host} unreachable.\n\n{text}"))
                }
            }
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn dns_lookup(&self, host: &str) -> ActionOutcome {
        let host = host.trim();
        if !valid_host(host) {
            return ActionOutcome::failed(format!("❌ Invalid host: {host}"));
        }
        let lookup = tokio::net::lookup_host((host, 0));
        match tokio::time::timeout(self.timeout, lookup).await {
            Ok(Ok(addrs)) => {
                let ips: BTreeSet<String> = addrs.map(|a| a.ip().to_string()).collect();
                if ips.is_empty() {
                    ActionOutcome::failed(format!("❌ No addresses for {host}"))
                } else {
                    let lines: Vec<String> = ips.into_iter().map(|ip| format!("  {ip}")).collect();
                    ActionOutcome::ok(format!("🔍 DNS Lookup: {host}\n\n{}", lines.join("\n")))
                }
            }
            Ok(Err(e)) => ActionOutcome::failed(format!("❌ DNS lookup failed for {host}: {e}")),
            Err(_) => ActionOutcome::failed(ControlError::Timeout(self.timeout.as_secs()).user_message()),
        }
    }

    async fn cpu_usage(&self) -> ActionOutcome {
        if cfg!(windows) {
            return self
                .report("wmic", &["cpu", "get", "loadpercentage"], "📈 CPU Usage")
                .await;
        }
        match tokio::fs::read_to_string("/proc/loadavg").await {
            Ok(raw) => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                match format_loadavg(&raw, cores) {
                    Some(text) => ActionOutcome::ok(text),
                    None => ActionOutcome::failed("❌ Unreadable /proc/loadavg"),
                }
            }
            Err(e) => ActionOutcome::failed(ControlError::from_io("/proc/loadavg", e).user_message()),
        }
    }

    async fn ram_usage(&self) -> ActionOutcome {
        if cfg!(windows) {
            return self
                .report(
                    "wmic",
                    &["OS", "get", "FreePhysicalMemory,TotalVisibleMemorySize", "/Value"],
                    "💾 RAM Usage",
                )
                .await;
        }
        match tokio::fs::read_to_string("/proc/meminfo").await {
            Ok(raw) => match format_meminfo(&raw) {
                Some(text) => ActionOutcome::ok(text),
                None => ActionOutcome::failed("❌ Unreadable /proc/meminfo"),
            },
            Err(e) => ActionOutcome::failed(ControlError::from_io("/proc/meminfo", e).user_message()),
        }
    }

    async fn status_report(&self) -> ActionOutcome {
        let cpu = self.cpu_usage().await;
        let ram = self.ram_usage().await;
        let disks = if cfg!(windows) {
            self.report(
                "wmic",
                &["logicaldisk", "get", "caption,freespace,size"],
                "💿 Disks",
            )
            .await
        } else {
            self.report("df", &["-h", "-x", "tmpfs"], "💿 Disks").await
        };
        let text = [cpu.message, ram.message, disks.message].join("\n\n");
        ActionOutcome {
            success: cpu.success && ram.success,
            message: format!("📊 System Status\n\n{text}"),
            payload: None,
        }
    }

    async fn open_url(&self, url: &str) -> ActionOutcome {
        let url = url.trim();
        if url.is_empty() || url.chars().any(char::is_whitespace) {
            return ActionOutcome::failed(format!("❌ Invalid URL: {url:?}"));
        }
        let url = if url.contains("://") {
            url.to_string()
        } else {
            format!("https://{url}")
        };
        if cfg!(windows) {
            self.simple("rundll32", &["url.dll,FileProtocolHandler", &url], &format!("Opened: {url}"))
                .await
        } else {
            self.simple("xdg-open", &[&url], &format!("Opened: {url}")).await
        }
    }

    async fn clipboard_get(&self) -> ActionOutcome {
        let result = if cfg!(windows) {
            self.run("powershell", &["-NoProfile", "-Command", "Get-Clipboard"]).await
        } else {
            self.run("xclip", &["-selection", "clipboard", "-o"]).await
        };
        match result {
            Ok(output) if output.status.success() => ActionOutcome::ok(format!(
                "📋 Clipboard content:\n\n{}",
                clip_output(&String::from_utf8_lossy(&output.stdout))
            )),
            Ok(output) => ActionOutcome::failed(format!("❌ Clipboard unavailable: {}", stderr_of(&output))),
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn clipboard_set(&self, text: &str) -> ActionOutcome {
        let result = if cfg!(windows) {
            self.run_with(
                "powershell",
                &["-NoProfile", "-Command", "$input | Set-Clipboard"],
                Some(text),
                self.timeout,
            )
            .await
        } else {
            self.run_with("xclip", &["-selection", "clipboard", "-i"], Some(text), self.timeout)
                .await
        };
        match result {
            Ok(output) if output.status.success() => ActionOutcome::ok("✅ Clipboard updated."),
            Ok(output) => ActionOutcome::failed(format!("❌ Clipboard unavailable: {}", stderr_of(&output))),
            Err(e) => ActionOutcome::failed(e.user_message()),
        }
    }

    async fn cleanup_temp(&self) -> ActionOutcome {
        let temp = std::env::temp_dir();
        let task = tokio::task::spawn_blocking(move || cleanup_dir(&temp));
        match task.await {
            Ok((removed, freed)) => ActionOutcome::ok(format!(
                "🧹 Cleanup done: {removed} items removed, {} freed.",
                MetadataConverter::format_size(freed)
            )),
            Err(e) => ActionOutcome::failed(format!("❌ Cleanup failed: {e}")),
        }
    }

    async fn largest_folders(&self, root: PathBuf) -> ActionOutcome {
        let scanned = root.clone();
        let task = tokio::task::spawn_blocking(move || largest_children(&scanned, TOP_FOLDERS));
        match task.await {
            Ok(Ok(top)) if top.is_empty() => {
                ActionOutcome::ok(format!("📊 No folders under {}", root.display()))
            }
            Ok(Ok(top)) => {
                let lines: Vec<String> = top
                    .iter()
                    .enumerate()
                    .map(|(i, (path, size))| {
                        format!(
                            "{}. {} ({})",
                            i + 1,
                            path.display(),
                            MetadataConverter::format_size(*size)
                        )
                    })
                    .collect();
                ActionOutcome::ok(format!(
                    "📊 Largest folders in {}:\n\n{}",
                    root.display(),
                    lines.join("\n")
                ))
            }
            Ok(Err(e)) => ActionOutcome::failed(e.user_message()),
            Err(e) => ActionOutcome::failed(format!("❌ Disk analysis failed: {e}")),
        }
    }
}

#[async_trait]
impl HostActions for ShellHost {
    async fn perform(&self, action: HostAction) -> ActionOutcome {
        let windows = cfg!(windows);
        let outcome = match action {
            HostAction::Shutdown if windows => {
                self.simple("shutdown", &["/s", "/t", "5"], "Shutting down.").await
            }
            HostAction::Shutdown => self.simple("shutdown", &["-h", "now"], "Shutting down.").await,
            HostAction::Restart if windows => {
                self.simple("shutdown", &["/r", "/t", "5"], "Restarting.").await
            }
            HostAction::Restart => self.simple("shutdown", &["-r", "now"], "Restarting.").await,
            HostAction::Sleep if windows => {
                self.simple(
                    "rundll32.exe",
                    &["powrprof.dll,SetSuspendState", "0,1,0"],
                    "Going to sleep.",
                )
                .await
            }
            HostAction::Sleep => self.simple("systemctl", &["suspend"], "Going to sleep.").await,
            HostAction::Lock if windows => {
                self.simple("rundll32.exe", &["user32.dll,LockWorkStation"], "Workstation locked.")
                    .await
            }
            HostAction::Lock => {
                self.simple("loginctl", &["lock-session"], "Workstation locked.").await
            }
            HostAction::MonitorOff if windows => {
                ActionOutcome::failed("❌ Monitor control is not available on this host.")
            }
            HostAction::MonitorOff => {
                self.simple("xset", &["dpms", "force", "off"], "Monitor turned off.").await
            }
            HostAction::Screenshot if windows => {
                ActionOutcome::failed("❌ Screenshots are not available on this host.")
            }
            HostAction::Screenshot => {
                self.capture(
                    "import",
                    &["-window", "root", "png:-"],
                    self.timeout,
                    (AttachmentKind::Photo, "screenshot.png"),
                    "Screenshot taken.",
                )
                .await
            }
            HostAction::WebcamCapture if windows => {
                ActionOutcome::failed("❌ Webcam capture is not available on this host.")
            }
            HostAction::WebcamCapture => {
                self.capture(
                    "ffmpeg",
                    &[
                        "-loglevel", "error", "-f", "video4linux2", "-i", "/dev/video0",
                        "-frames:v", "1", "-f", "image2pipe", "-vcodec", "png", "-",
                    ],
                    self.timeout,
                    (AttachmentKind::Photo, "webcam.png"),
                    "Webcam frame captured.",
                )
                .await
            }
            HostAction::MicRecord { .. } if windows => {
                ActionOutcome::failed("❌ Audio capture is not available on this host.")
            }
            HostAction::MicRecord { seconds } => {
                let duration = seconds.to_string();
                self.capture(
                    "ffmpeg",
                    &[
                        "-loglevel", "error", "-f", "alsa", "-i", "default", "-t", &duration,
                        "-f", "ogg", "-",
                    ],
                    self.timeout + Duration::from_secs(u64::from(seconds)),
                    (AttachmentKind::Voice, "recording.ogg"),
                    &format!("Recorded {seconds}s of audio."),
                )
                .await
            }
            HostAction::ClipboardGet => self.clipboard_get().await,
            HostAction::ClipboardSet(text) => self.clipboard_set(&text).await,
            HostAction::CleanupTemp => self.cleanup_temp().await,
            HostAction::LargestFolders(root) => self.largest_folders(root).await,
            HostAction::OpenUrl(url) => self.open_url(&url).await,
            HostAction::RunProgram(path) => self.run_program(&path).await,
            HostAction::ExecuteCommand(command) => self.execute(&command).await,
            HostAction::KillProcess(pid) => self.kill(pid).await,
            HostAction::RestartProcess(pid) => self.restart(pid).await,
            HostAction::SetPriority(pid, priority) => self.set_priority(pid, priority).await,
            HostAction::ProcessInfo(pid) => self.process_info(pid).await,
            HostAction::PublicIp => {
                self.report("curl", &["-s", "https://api.ipify.org"], "🌐 Public IP:")
                    .await
            }
            HostAction::Ping(host) => self.ping(&host).await,
            HostAction::Netstat if windows => {
                self.report("netstat", &["-an"], "📊 Active connections:").await
            }
            HostAction::Netstat => self.report("ss", &["-tun"], "📊 Active connections:").await,
            HostAction::DnsLookup(host) => self.dns_lookup(&host).await,
            HostAction::SpeedTest => match self
                .run_with("speedtest-cli", &["--simple"], None, SPEEDTEST_TIMEOUT)
                .await
            {
                Ok(output) if output.status.success() => ActionOutcome::ok(format!(
                    "⚡ Speedtest:\n\n{}",
                    String::from_utf8_lossy(&output.stdout).trim()
                )),
                Ok(output) => ActionOutcome::failed(format!("❌ Speedtest failed: {}", stderr_of(&output))),
                Err(e) => ActionOutcome::failed(e.user_message()),
            },
            HostAction::CpuUsage => self.cpu_usage().await,
            HostAction::RamUsage => self.ram_usage().await,
            HostAction::StatusReport => self.status_report().await,
        };
        if !outcome.success {
            warn!("host action failed: {}", outcome.message);
        }
        outcome
    }

    async fn list_processes(&self) -> Result<Vec<ProcessSummary>> {
        let mut processes = if cfg!(windows) {
            let output = self.run("tasklist", &["/FO", "CSV", "/NH"]).await?;
            parse_tasklist(&String::from_utf8_lossy(&output.stdout))
        } else {
            let output = self.run("ps", &["-eo", "pid=,rss=,comm="]).await?;
            parse_ps(&String::from_utf8_lossy(&output.stdout))
        };
        processes.sort_by(|a, b| b.ram_mb.total_cmp(&a.ram_mb));
        Ok(processes)
    }
}

fn stderr_of(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exit code {}", exit_code(output))
    } else {
        clip_output(stderr)
    }
}

fn exit_code(output: &Output) -> String {
    output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string())
}

fn valid_host(host: &str) -> bool {
    !host.is_empty()
        && !host.starts_with('-')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '_'))
}

fn split_cmdline(raw: &[u8]) -> Vec<String> {
    raw.split(|b| *b == 0)
        .filter(|part| !part.is_empty())
        .map(|part| String::from_utf8_lossy(part).into_owned())
        .collect()
}

fn parse_ps(raw: &str) -> Vec<ProcessSummary> {
    raw.lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let pid = fields.next()?.parse().ok()?;
            let rss_kb: f64 = fields.next()?.parse().ok()?;
            let name = fields.collect::<Vec<_>>().join(" ");
            Some(ProcessSummary {
                pid,
                name: if name.is_empty() { "Unknown".into() } else { name },
                ram_mb: rss_kb / 1024.0,
            })
        })
        .collect()
}

fn parse_tasklist(raw: &str) -> Vec<ProcessSummary> {
    raw.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line
                .trim()
                .trim_matches('"')
                .split("\",\"")
                .collect();
            if fields.len() < 5 {
                return None;
            }
            let pid = fields[1].parse().ok()?;
            let kb: String = fields[4].chars().filter(char::is_ascii_digit).collect();
            Some(ProcessSummary {
                pid,
                name: fields[0].to_string(),
                ram_mb: kb.parse::<f64>().unwrap_or(0.0) / 1024.0,
            })
        })
        .collect()
}

fn format_loadavg(raw: &str, cores: usize) -> Option<String> {
    let mut fields = raw.split_whitespace();
    let one = fields.next()?;
    let five = fields.next()?;
    let fifteen = fields.next()?;
    let percent = one.parse::<f64>().ok()? / cores as f64 * 100.0;
    Some(format!(
        "📈 CPU Load: {percent:.1}% of {cores} cores\nLoad average: {one} / {five} / {fifteen}"
    ))
}

fn format_meminfo(raw: &str) -> Option<String> {
    let field = |name: &str| -> Option<u64> {
        raw.lines()
            .find(|l| l.starts_with(name))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total_kb = field("MemTotal:")?;
    let available_kb = field("MemAvailable:")?;
    if total_kb == 0 {
        return None;
    }
    let used_kb = total_kb.saturating_sub(available_kb);
    Some(format!(
        "💾 RAM Usage: {:.1}%\nUsed: {} / Total: {}\nAvailable: {}",
        used_kb as f64 / total_kb as f64 * 100.0,
        MetadataConverter::format_size(used_kb * 1024),
        MetadataConverter::format_size(total_kb * 1024),
        MetadataConverter::format_size(available_kb * 1024)
    ))
}

/// Somma delle dimensioni dei file sotto `path`; i link simbolici non vengono seguiti.
fn tree_size(path: &Path) -> u64 {
    WalkDir::new(path)
        .follow_links(false)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| !entry.file_type().is_dir())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

fn children(dir: &Path) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    WalkDir::new(dir)
        .follow_links(false)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
}

fn cleanup_dir(dir: &Path) -> (usize, u64) {
    let mut removed = 0;
    let mut freed = 0;
    for entry in children(dir).filter_map(|e| e.ok()) {
        let path = entry.path();
        let size = tree_size(path);
        let result = if entry.file_type().is_dir() {
            std::fs::remove_dir_all(path)
        } else {
            std::fs::remove_file(path)
        };
        // file in uso o protetti vengono lasciati dove sono
        if result.is_ok() {
            removed += 1;
            freed += size;
        }
    }
    (removed, freed)
}

fn largest_children(root: &Path, count: usize) -> Result<Vec<(PathBuf, u64)>> {
    std::fs::read_dir(root).map_err(|e| ControlError::from_io(root, e))?;
    let mut sizes: Vec<(PathBuf, u64)> = children(root)
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir())
        .map(|e| {
            let size = tree_size(e.path());
            (e.into_path(), size)
        })
        .collect();
    sizes.sort_by(|a, b| b.1.cmp(&a.1));
    sizes.truncate(count);
    Ok(sizes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ps_output() {
        let raw = "    1  10240 systemd\n  742 204800 firefox-bin\n  bogus line\n  900 0 kworker/0:1 extra\n";
        let procs = parse_ps(raw);
        assert_eq!(procs.len(), 3);
        assert_eq!(procs[1].pid, 742);
        assert_eq!(procs[1].name, "firefox-bin");
        assert!((procs[1].ram_mb - 200.0).abs() < f64::EPSILON);
        assert_eq!(procs[2].name, "kworker/0:1 extra");
    }

    #[test]
    fn parses_tasklist_csv() {
        let raw = "\"System Idle Process\",\"0\",\"Services\",\"0\",\"8 K\"\r\n\"chrome.exe\",\"4312\",\"Console\",\"1\",\"153,600 K\"\r\n";
        let procs = parse_tasklist(raw);
        assert_eq!(procs.len(), 2);
        assert_eq!(procs[1].name, "chrome.exe");
        assert_eq!(procs[1].pid, 4312);
        assert!((procs[1].ram_mb - 150.0).abs() < f64::EPSILON);
    }

    #[test]
    fn formats_proc_readings() {
        let load = format_loadavg("2.00 1.50 1.00 3/512 9999\n", 4).unwrap();
        assert!(load.starts_with("📈 CPU Load: 50.0% of 4 cores"));
        assert!(format_loadavg("", 4).is_none());

        let meminfo = "MemTotal:       8388608 kB\nMemFree:  1 kB\nMemAvailable:   2097152 kB\n";
        let ram = format_meminfo(meminfo).unwrap();
        assert!(ram.starts_with("💾 RAM Usage: 75.0%"));
        assert!(ram.contains("Total: 8.0 GB"));
        assert!(format_meminfo("MemTotal: 0 kB\nMemAvailable: 0 kB").is_none());
    }

    #[test]
    fn hosts_are_validated() {
        assert!(valid_host("example.com"));
        assert!(valid_host("::1"));
        assert!(!valid_host("-f"));
        assert!(!valid_host("a; rm -rf /"));
        assert!(!valid_host(""));
    }

    #[test]
    fn sizes_and_cleanup_walk_trees() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("big/inner")).unwrap();
        std::fs::write(dir.path().join("big/inner/f"), vec![0u8; 300]).unwrap();
        std::fs::create_dir(dir.path().join("small")).unwrap();
        std::fs::write(dir.path().join("small/f"), vec![0u8; 10]).unwrap();
        std::fs::write(dir.path().join("loose"), vec![0u8; 5]).unwrap();

        let top = largest_children(dir.path(), 10).unwrap();
        assert_eq!(top.len(), 2);
        assert!(top[0].0.ends_with("big"));
        assert_eq!(top[0].1, 300);

        assert_eq!(cleanup_dir(dir.path()), (3, 315));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn sizes_do_not_follow_symlink_loops() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        std::fs::create_dir(&tree).unwrap();
        std::fs::write(tree.join("f"), vec![0u8; 40]).unwrap();
        std::os::unix::fs::symlink(&tree, tree.join("loop")).unwrap();

        let link_len = std::fs::symlink_metadata(tree.join("loop")).unwrap().len();
        assert_eq!(tree_size(&tree), 40 + link_len);
        assert!(largest_children(&dir.path().join("missing"), 3).is_err());
    }

    #[test]
    fn cmdline_splits_on_nul() {
        assert_eq!(
            split_cmdline(b"/usr/bin/app\0--flag\0value\0"),
            vec!["/usr/bin/app", "--flag", "value"]
        );
    }

    #[tokio::test]
    async fn dns_lookup_resolves_localhost() {
        let host = ShellHost::new(Duration::from_secs(5));
        let outcome = host.perform(HostAction::DnsLookup("localhost".into())).await;
        assert!(outcome.success, "{}", outcome.message);
        assert!(outcome.message.contains("127.0.0.1") || outcome.message.contains("::1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn commands_time_out() {
        let host = ShellHost::new(Duration::from_millis(200));
        let outcome = host.perform(HostAction::ExecuteCommand("sleep 5".into())).await;
        assert!(!outcome.success);
        assert_eq!(outcome.message, "❌ Command timeout (0s)");
    }
}
