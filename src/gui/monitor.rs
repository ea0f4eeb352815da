use std::{
    collections::VecDeque,
    io::stdout,
    sync::mpsc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    gui::error::GuiError,
    position_classifier::{Classification, TargetPosition},
    range_sensor::RangeSensor,
    supervisor::{CycleOutcome, PlaybackSupervisor},
    target_detector::TargetDetector,
};

use crossterm::{
    event::{self, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use log::debug;
use ratatui::{
    prelude::*,
    widgets::{
        block::{Position, Title},
        *,
    },
    Terminal,
};

/// How many past cycles the monitor lists.
const HISTORY_LEN: usize = 12;

enum Signal {
    Stop,
}

/// What happened while the monitor was open.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSummary {
    /// Guidance cycles run
    pub cycles: u64,
    /// Cycles that started a new sound
    pub handovers: u64,
    /// Whether the detector ran out before the user stopped
    pub source_closed: bool,
}

#[derive(Debug, Default)]
struct MonitorState {
    summary: MonitorSummary,
    detection: Option<Option<TargetPosition>>,
    classification: Classification,
    miss_count: u32,
    range_mm: Option<u32>,
    history: VecDeque<String>,
}

impl MonitorState {
    fn record<S: RangeSensor>(
        &mut self,
        detection: Option<TargetPosition>,
        outcome: CycleOutcome,
        supervisor: &PlaybackSupervisor<S>,
    ) {
        self.summary.cycles += 1;
        if let CycleOutcome::Handover { .. } = outcome {
            self.summary.handovers += 1;
        }
        self.detection = Some(detection);
        self.classification = supervisor.active_classification();
        self.miss_count = supervisor.miss_count();
        self.range_mm = supervisor.last_range();

        if self.history.len() == HISTORY_LEN {
            self.history.pop_back();
        }
        self.history
            .push_front(format!("#{:<5} {}", self.summary.cycles, outcome));
    }

    fn status_lines(&self) -> Vec<Line<'static>> {
        let detection = match self.detection {
            None => "waiting for first frame".to_string(),
            Some(None) => "no target".to_string(),
            Some(Some(position)) => position.to_string(),
        };
        let range = match self.range_mm {
            Some(mm) => format!("{:.2} m", mm as f64 / 1000.0),
            None => "unknown".to_string(),
        };
        let mut lines = vec![
            Line::from(vec![
                " Cue: ".into(),
                Span::styled(
                    self.classification.to_string(),
                    Style::default()
                        .fg(classification_color(self.classification))
                        .add_modifier(Modifier::BOLD),
                ),
            ]),
            Line::from(format!(" Target: {}", detection)),
            Line::from(format!(" Range: {}", range)),
            Line::from(format!(
                " Misses: {}   Cycles: {}   Sounds started: {}",
                self.miss_count, self.summary.cycles, self.summary.handovers
            )),
        ];
        if self.summary.source_closed {
            lines.push(Line::from(" Detection source closed ".red().bold()));
        }
        lines
    }
}

fn classification_color(classification: Classification) -> Color {
    match classification {
        Classification::WideLeft | Classification::WideRight => Color::Yellow,
        Classification::Track => Color::Cyan,
        Classification::Bulls => Color::Green,
        Classification::Idle => Color::DarkGray,
    }
}

/// Pulls detections on a background thread, since reading the next one may
/// block for a long time.
fn spawn_reader<D>(
    mut detector: D,
) -> (
    mpsc::Sender<Signal>,
    mpsc::Receiver<Option<TargetPosition>>,
    JoinHandle<()>,
)
where
    D: TargetDetector + Send + 'static,
{
    let (stop_tx, stop_rx) = mpsc::channel();
    let (det_tx, det_rx) = mpsc::channel();

    let th = thread::spawn(move || loop {
        if let Ok(Signal::Stop) = stop_rx.try_recv() {
            break;
        }
        match detector.next() {
            Some(detection) => {
                if det_tx.send(detection).is_err() {
                    break;
                }
            }
            None => break,
        }
    });

    (stop_tx, det_rx, th)
}

/// Runs the guidance loop behind a live terminal view until the user presses
/// a key. The supervisor is shut down before returning.
pub fn monitor<D, S>(
    detector: D,
    mut supervisor: PlaybackSupervisor<S>,
) -> Result<MonitorSummary, GuiError>
where
    D: TargetDetector + Send + 'static,
    S: RangeSensor,
{
    let (stop_tx, det_rx, th) = spawn_reader(detector);

    enable_raw_mode()?;
    stdout().execute(EnterAlternateScreen)?;
    let res = monitor_loop(&det_rx, &mut supervisor);
    disable_raw_mode()?;
    stdout().execute(LeaveAlternateScreen)?;

    supervisor.shutdown();
    // The reader may already have exited on its own
    let _ = stop_tx.send(Signal::Stop);
    if th.is_finished() {
        th.join().map_err(|_| GuiError::JoinError)?;
    } else {
        debug!("Detector is still blocked, leaving its reader thread behind");
    }

    res
}

fn monitor_loop<S: RangeSensor>(
    det_rx: &mpsc::Receiver<Option<TargetPosition>>,
    supervisor: &mut PlaybackSupervisor<S>,
) -> Result<MonitorSummary, GuiError> {
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout()))?;
    terminal.clear()?;

    let mut state = MonitorState::default();
    loop {
        loop {
            match det_rx.try_recv() {
                Ok(detection) => {
                    let outcome = supervisor.run_cycle(detection);
                    state.record(detection, outcome, supervisor);
                }
                Err(mpsc::TryRecvError::Empty) => break,
                Err(mpsc::TryRecvError::Disconnected) => {
                    state.summary.source_closed = true;
                    break;
                }
            }
        }

        let title = Title::from(" AimTone Monitor ".magenta().bold());
        let instructions = Title::from(Line::from(vec![
            " Stop ".into(),
            "<Any key> ".magenta().bold(),
        ]));
        let status = Paragraph::new(state.status_lines()).block(
            Block::default()
                .title(title.alignment(Alignment::Center))
                .borders(Borders::ALL),
        );
        let history = List::new(state.history.iter().cloned())
            .style(Style::default().fg(Color::White))
            .block(
                Block::default()
                    .title(" Recent cycles ")
                    .title(
                        instructions
                            .alignment(Alignment::Center)
                            .position(Position::Bottom),
                    )
                    .borders(Borders::ALL),
            );
        terminal.draw(|frame| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(7), Constraint::Min(0)])
                .split(frame.size());
            frame.render_widget(status, chunks[0]);
            frame.render_widget(history, chunks[1]);
        })?;

        if event::poll(Duration::from_millis(16))? {
            if let event::Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    return Ok(state.summary);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GuidanceConfig;
    use crate::playback::SilentOutput;
    use crate::range_sensor::NoRangeSensor;
    use std::sync::Arc;

    fn supervisor() -> PlaybackSupervisor<NoRangeSensor> {
        let config = GuidanceConfig {
            handover_grace_secs: 0.0,
            ..GuidanceConfig::default()
        };
        PlaybackSupervisor::new(&config, NoRangeSensor, Arc::new(SilentOutput))
    }

    #[test]
    fn state_tracks_the_supervisor() {
        let mut s = supervisor();
        let mut state = MonitorState::default();

        let bulls = Some(TargetPosition::new(320, 240));
        let outcome = s.run_cycle(bulls);
        state.record(bulls, outcome, &s);
        let outcome = s.run_cycle(None);
        state.record(None, outcome, &s);

        assert_eq!(state.summary.cycles, 2);
        assert_eq!(state.summary.handovers, 1);
        assert_eq!(state.classification, Classification::Bulls);
        assert_eq!(state.miss_count, 1);
        assert_eq!(state.detection, Some(None));
        assert!(state.history[0].starts_with("#2"));
        assert!(state.history[1].starts_with("#1"));
    }

    #[test]
    fn history_is_bounded() {
        let mut s = supervisor();
        let mut state = MonitorState::default();
        for _ in 0..(HISTORY_LEN + 5) {
            let outcome = s.run_cycle(None);
            state.record(None, outcome, &s);
        }
        assert_eq!(state.history.len(), HISTORY_LEN);
        assert!(state.history[0].starts_with(&format!("#{}", HISTORY_LEN + 5)));
    }

    #[test]
    fn closed_source_is_shown() {
        let mut state = MonitorState::default();
        assert_eq!(state.status_lines().len(), 4);
        state.summary.source_closed = true;
        assert_eq!(state.status_lines().len(), 5);
    }

    #[test]
    fn reader_forwards_until_the_detector_ends() {
        let detections = vec![Some(TargetPosition::new(1, 2)), None];
        let (_stop_tx, det_rx, th) = spawn_reader(detections.clone().into_iter());
        th.join().unwrap();
        let received: Vec<_> = det_rx.try_iter().collect();
        assert_eq!(received, detections);
        assert!(matches!(
            det_rx.try_recv(),
            Err(mpsc::TryRecvError::Disconnected)
        ));
    }
}
