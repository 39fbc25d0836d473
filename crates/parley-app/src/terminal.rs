//! 터미널 프런트엔드.
//!
//! 표준입력 한 줄을 명령으로 해석하고, 세션 업데이트를 출력한다.

use anyhow::Result;
use parley_core::models::message::{AudioClip, Role, TranscriptEntry};
use parley_core::models::session::UserInput;
use parley_core::models::summary::{SessionReport, SessionSummary};
use parley_session::client::SessionClient;
use parley_session::error::SessionError;
use parley_session::lifecycle::Lifecycle;
use parley_session::overlays::{Overlay, OverlayKind};
use parley_session::store::{SessionStore, SessionUpdate};
use std::path::PathBuf;
use tokio::io::{AsyncBufRead, Lines};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// 사용자 명령
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Say(String),
    Audio(PathBuf),
    Ready,
    Dismiss(OverlayKind),
    End,
    Report,
    Retry,
    Quit,
    Help,
    Unknown(String),
}

/// 세션 화면 종료 후 다음 동작
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// 같은 요청으로 새 세션
    Retry,
    Exit,
}

pub fn parse_command(line: &str) -> Option<Command> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Some(Command::Say(line.to_string()));
    };

    let (name, arg) = match rest.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (rest, ""),
    };
    let command = match name {
        "audio" if !arg.is_empty() => Command::Audio(PathBuf::from(arg)),
        "ready" => Command::Ready,
        "dismiss" => match arg {
            "" | "hint" => Command::Dismiss(OverlayKind::Hint),
            "reversal" => Command::Dismiss(OverlayKind::Reversal),
            "event" => Command::Dismiss(OverlayKind::Event),
            other => Command::Unknown(format!("dismiss {other}")),
        },
        "end" => Command::End,
        "report" => Command::Report,
        "retry" => Command::Retry,
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        _ => Command::Unknown(rest.to_string()),
    };
    Some(command)
}

pub fn help_text() -> &'static str {
    "명령: <텍스트> 전송 | /audio <파일> | /ready | /dismiss [hint|reversal|event] | \
     /end | /report | /retry | /quit"
}

pub fn render_entry(entry: &TranscriptEntry) -> String {
    let speaker = match entry.role {
        Role::User => "나",
        Role::Counterpart => "상대",
    };
    let mut line = format!("[{speaker}] ");
    match (&entry.text, &entry.audio) {
        (Some(text), _) => line.push_str(text),
        (None, Some(audio)) => line.push_str(&format!("(음성 {} bytes)", audio.len())),
        (None, None) => {}
    }
    if let Some(mood) = entry.mood {
        line.push_str(&format!(" <{mood}>"));
    }
    if let Some(delta) = entry.gauge_delta {
        line.push_str(&format!(" ({delta:+})"));
    }
    if let Some(annotation) = &entry.annotation {
        line.push_str(&format!(" #{}", annotation.label));
    }
    line
}

fn render_overlay(overlay: &Overlay) -> String {
    let label = match overlay.kind {
        OverlayKind::Reversal => "반전",
        OverlayKind::Event => "이벤트",
        OverlayKind::Hint => "힌트",
    };
    match &overlay.title {
        Some(title) => format!("*** {label} [{title}]: {} ***", overlay.message),
        None => format!("*** {label}: {} ***", overlay.message),
    }
}

pub fn render_summary(summary: &SessionSummary) -> String {
    let mut out = String::new();
    let verdict = if summary.converted {
        "전환 성공"
    } else {
        "전환 실패"
    };
    out.push_str(&format!(
        "=== 세션 종료: {verdict} ===\n게이지 {} → {} ({:+})\n",
        summary.starting_gauge, summary.final_gauge, summary.delta
    ));
    for strength in &summary.strengths {
        out.push_str(&format!("  + {strength}\n"));
    }
    for improvement in &summary.improvements {
        out.push_str(&format!("  - {improvement}\n"));
    }
    if let Some(feedback) = &summary.overall_feedback {
        out.push_str(&format!("{feedback}\n"));
    }
    out.push_str("/retry 새 세션 | /report 상세 리포트 | /quit 종료");
    out
}

fn render_report(report: &SessionReport) -> String {
    let mut out = format!("=== 리포트 {} ===", report.session_id);
    if let Some(secs) = report.duration_secs {
        out.push_str(&format!("\n소요: {}분 {}초", secs / 60, secs % 60));
    }
    if let Some(count) = report.message_count {
        out.push_str(&format!("\n메시지: {count}개"));
    }
    out
}

/// 업데이트 한 건을 출력할 줄로 변환. 출력할 것이 없으면 `None`
pub fn render_update(update: &SessionUpdate, show_gauge: bool) -> Option<String> {
    match update {
        SessionUpdate::EntryAppended(entry) if entry.role == Role::Counterpart => {
            Some(render_entry(entry))
        }
        SessionUpdate::EntryAppended(_) => None,
        SessionUpdate::Gauge(gauge) if show_gauge => Some(format!(
            "[게이지] {} ({:+}) {}",
            gauge.value, gauge.last_delta, gauge.mood
        )),
        SessionUpdate::Gauge(_) => None,
        SessionUpdate::Thinking(true) => Some("…상대가 생각 중".to_string()),
        SessionUpdate::Thinking(false) => None,
        SessionUpdate::OverlayShown(overlay) => Some(render_overlay(overlay)),
        SessionUpdate::OverlayDismissed(_) => None,
        SessionUpdate::Connection(state) if state.is_exhausted() => {
            Some("!! 연결 끊김: 메시지는 HTTP로 전송됩니다".to_string())
        }
        SessionUpdate::Connection(state) if state.reconnect_attempts > 0 => Some(format!(
            "[연결] 재연결 중 ({}/{})",
            state.reconnect_attempts, state.max_attempts
        )),
        SessionUpdate::Connection(state) => Some(format!("[연결] {}", state.status)),
        SessionUpdate::Lifecycle(Lifecycle::Preparing) => {
            Some("준비되면 /ready 를 입력하세요".to_string())
        }
        SessionUpdate::Lifecycle(_) => None,
        SessionUpdate::Error(message) => Some(format!("!! {message}")),
        SessionUpdate::Ended(summary) => Some(render_summary(summary)),
    }
}

/// 세션 시작 화면
pub fn render_intro(store: &SessionStore) -> String {
    let persona = store.persona();
    let mut out = format!("=== 세션 {} ===", store.session_id().map(|id| id.as_str()).unwrap_or("-"));
    if !persona.name.is_empty() {
        out.push_str(&format!("\n상대: {} ({}, {})", persona.name, persona.role, persona.company));
    }
    if let Some(scenario) = store.scenario() {
        out.push_str(&format!("\n상황: {scenario}"));
    }
    for entry in store.transcript() {
        out.push('\n');
        out.push_str(&render_entry(entry));
    }
    if store.config().show_gauge {
        out.push_str(&format!("\n[게이지] {} {}", store.gauge().value, store.gauge().mood));
    }
    out
}

async fn print_updates(mut updates: broadcast::Receiver<SessionUpdate>, show_gauge: bool) {
    loop {
        match updates.recv().await {
            Ok(update) => {
                if let Some(line) = render_update(&update, show_gauge) {
                    println!("{line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("화면 업데이트 {skipped}개 누락");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn print_error(err: &SessionError) {
    match err {
        SessionError::UpgradeRequired { message, .. } => {
            println!("!! 업그레이드가 필요합니다: {message}");
        }
        other if other.is_retryable() => println!("!! {other} (다시 시도하세요)"),
        other => println!("!! {other}"),
    }
}

/// 세션 하나의 입력 루프
pub async fn run_session<R>(client: &SessionClient, lines: &mut Lines<R>) -> Result<Outcome>
where
    R: AsyncBufRead + Unpin,
{
    let snapshot = client.snapshot();
    println!("{}", render_intro(&snapshot));
    println!("{}", help_text());

    let printer = tokio::spawn(print_updates(
        client.subscribe(),
        snapshot.config().show_gauge,
    ));

    let outcome = loop {
        let Some(line) = lines.next_line().await? else {
            break Outcome::Exit;
        };
        let Some(command) = parse_command(&line) else {
            continue;
        };
        debug!("명령: {command:?}");

        match command {
            Command::Say(text) => {
                if let Err(e) = client.send(UserInput::text(text)).await {
                    print_error(&e);
                }
            }
            Command::Audio(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    if let Err(e) = client.send(UserInput::audio(AudioClip(bytes))).await {
                        print_error(&e);
                    }
                }
                Err(e) => println!("!! 오디오 파일 읽기 실패 ({}): {e}", path.display()),
            },
            Command::Ready => {
                if !client.confirm_ready() {
                    println!("!! 준비 단계가 아닙니다 (현재: {})", client.lifecycle());
                }
            }
            Command::Dismiss(kind) => client.dismiss(kind),
            Command::End => {
                // 요약은 업데이트 출력기가 그린다
                if let Err(e) = client.end().await {
                    print_error(&e);
                }
            }
            Command::Report => match client.fetch_report().await {
                Ok(report) => println!("{}", render_report(&report)),
                Err(e) => print_error(&e),
            },
            Command::Retry => {
                if client.lifecycle().is_terminal() {
                    break Outcome::Retry;
                }
                println!("!! 진행 중인 세션은 /end 로 먼저 종료하세요");
            }
            Command::Quit => break Outcome::Exit,
            Command::Help => println!("{}", help_text()),
            Command::Unknown(raw) => println!("!! 알 수 없는 명령: /{raw}"),
        }
    };

    printer.abort();
    Ok(outcome)
}
