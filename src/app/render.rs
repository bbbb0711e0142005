//! TUI描画関連の関数。

use ratatui::{
    Frame,
    prelude::*,
    widgets::{Block, Borders, Clear, Gauge, List, ListItem, ListState, Paragraph, Row, Table, Wrap},
};

use crate::{
    events::{Pane, Screen},
    input,
    jobs::JobStatus,
    layout,
    operation::Operation,
    shortcuts::Shortcuts,
};

use super::App;

/// 画面全体のレイアウトを描画する。
pub fn draw(f: &mut Frame, app: &App) {
    // メインレイアウト（Body + HELP + STATUS）を作る。
    let main_layout = layout::create_main_layout(f.area());

    match app.ui.screen {
        Screen::Main => {
            let body_layout = layout::create_body_layout(main_layout.body);
            draw_media(f, app, body_layout.media);
            draw_actions(f, app, body_layout.actions);
            draw_results(f, app, body_layout.results);
            draw_log(f, app, body_layout.log);
        }
        Screen::Settings => draw_settings(f, app, main_layout.body),
    }

    // HELPバー（画面ごとのショートカット）を描画する。
    let help_text = get_help_text(&app.ui.screen, &app.shortcuts);
    let help_bar = Paragraph::new(help_text)
        .block(Block::default().borders(Borders::ALL).title("HELP"))
        .wrap(Wrap { trim: true });
    f.render_widget(help_bar, main_layout.help_bar);

    // STATUSバー（画面名・作業セット情報・エラー）を描画する。
    let status_bar = build_status_bar(app);
    f.render_widget(status_bar, main_layout.status_bar);

    // 実行中のジョブがあれば進捗モーダルを重ねる。
    if app.ui.screen == Screen::Main {
        draw_progress_modal(f, app);
    }

    // 入力ボックスが開いていれば最前面に描画する。
    if let Some(input_state) = &app.input_box {
        input::render_input_box(f, input_state);
    }
}

/// フォーカス中のパネルは枠を強調する。
fn pane_block(app: &App, pane: Pane, title: &str) -> Block<'static> {
    let block = Block::default()
        .borders(Borders::ALL)
        .title(title.to_string());
    if app.ui.pane == pane {
        block.border_style(Style::default().fg(Color::Rgb(255, 140, 0)))
    } else {
        block
    }
}

/// 選択行のハイライトスタイル。
fn highlight() -> Style {
    Style::default()
        .bg(Color::Rgb(255, 140, 0)) // オレンジ色の背景
        .fg(Color::Black) // 黒文字
        .add_modifier(Modifier::BOLD)
}

/// MEDIAテーブルを描画する。
fn draw_media(f: &mut Frame, app: &App, area: Rect) {
    let ws = &app.session.working_set;

    // 作業セットの順にテーブル行を組み立てる。
    let rows = ws.items().enumerate().map(|(i, m)| {
        Row::new(vec![
            format!("{}", i + 1),
            m.name.clone(),
            m.mime.clone(),
            human_size(m.size()),
        ])
    });

    let title = format!("MEDIA ({} / {})", ws.len(), human_size(ws.total_bytes()));
    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Min(10),
            Constraint::Length(16),
            Constraint::Length(10),
        ],
    )
    .block(pane_block(app, Pane::Media, &title))
    .header(Row::new(vec!["#", "file", "type", "size"]).bold())
    .row_highlight_style(highlight());

    // 選択中の行をハイライトする。
    let mut table_state = ratatui::widgets::TableState::default();
    if !ws.is_empty() {
        table_state.select(Some(app.ui.selected_media));
    }
    f.render_stateful_widget(table, area, &mut table_state);
}

/// ACTIONS一覧（操作ごとの状態付き）を描画する。
fn draw_actions(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = Operation::ALL
        .iter()
        .map(|op| {
            let state = match app.session.job(*op) {
                Some(job) => status_str(&job.status, job.progress),
                None => String::new(),
            };
            ListItem::new(format!("{:<22} {}", op.label(), state))
        })
        .collect();

    let list = List::new(items)
        .block(pane_block(app, Pane::Actions, "ACTIONS"))
        .highlight_style(highlight());

    let mut state = ListState::default();
    state.select(Some(app.ui.selected_action));
    f.render_stateful_widget(list, area, &mut state);
}

/// RESULTS一覧（保存可能なファイル）を描画する。
fn draw_results(f: &mut Frame, app: &App, area: Rect) {
    let rows = app.result_rows();
    let items: Vec<ListItem> = rows
        .iter()
        .map(|r| ListItem::new(format!("{}  [{}]", r.file_name, r.operation.label())))
        .collect();

    let list = List::new(items)
        .block(pane_block(app, Pane::Results, "RESULTS"))
        .highlight_style(highlight());

    let mut state = ListState::default();
    if !rows.is_empty() {
        state.select(Some(app.ui.selected_result.min(rows.len() - 1)));
    }
    f.render_stateful_widget(list, area, &mut state);
}

/// 通知ログ（新しいものを下に）を描画する。
fn draw_log(f: &mut Frame, app: &App, area: Rect) {
    // 枠の内側に収まる行数だけ末尾から取り出す。
    let visible = area.height.saturating_sub(2) as usize;
    let start = app.ui.log.len().saturating_sub(visible);
    let text = app.ui.log[start..].join("\n");

    let panel = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("LOG"))
        .wrap(Wrap { trim: true });
    f.render_widget(panel, area);
}

/// 設定画面を描画する。
fn draw_settings(f: &mut Frame, app: &App, area: Rect) {
    let text = format!(
        "Server base URL: {}\nDownload folder: {}\n\nRequest timeout: {}\nProgress tick: {} ms (ceiling {}%)\n\nConfig file: {}",
        app.base_url,
        app.output_dir,
        match app.cfg.server.timeout() {
            Some(d) => format!("{} s", d.as_secs()),
            None => "none".into(),
        },
        app.cfg.progress.tick_ms,
        app.cfg.progress.ceiling(),
        app.cfg_path.display(),
    );

    let panel = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("SETTINGS"))
        .wrap(Wrap { trim: true });
    f.render_widget(panel, area);
}

/// 実行中ジョブの進捗をモーダルで表示する。
fn draw_progress_modal(f: &mut Frame, app: &App) {
    let pending: Vec<_> = app.session.pending().collect();
    if pending.is_empty() {
        return;
    }

    // ジョブ1件につきゲージ1本、上下の枠とヘルプ行の分を足す。
    let height = pending.len() as u16 * 2 + 3;
    let area = input::centered_popup(f.area(), 60, height);
    f.render_widget(Clear, area);
    f.render_widget(
        Block::default()
            .borders(Borders::ALL)
            .title("Processing")
            .style(Style::default().bg(Color::DarkGray)),
        area,
    );

    let mut constraints: Vec<Constraint> = pending
        .iter()
        .flat_map(|_| [Constraint::Length(1), Constraint::Length(1)])
        .collect();
    constraints.push(Constraint::Length(1));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .margin(1)
        .constraints(constraints)
        .split(area);

    for (i, job) in pending.iter().enumerate() {
        let label = Paragraph::new(format!(
            "{} ({} file(s)). Please wait...",
            job.operation.label(),
            job.item_count
        ))
        .style(Style::default().fg(Color::Cyan));
        f.render_widget(label, rows[i * 2]);

        let gauge = Gauge::default()
            .gauge_style(Style::default().fg(Color::Green).bg(Color::Black))
            .percent(u16::from(job.progress.min(100)));
        f.render_widget(gauge, rows[i * 2 + 1]);
    }

    let help = Paragraph::new(format!(
        "{}: cancel",
        format_keys(&app.shortcuts.main.cancel)
    ))
    .style(Style::default().fg(Color::Gray))
    .alignment(Alignment::Center);
    f.render_widget(help, rows[pending.len() * 2]);
}

/// ステータスバーを構築する。
fn build_status_bar(app: &App) -> Paragraph<'static> {
    let screen_name = match app.ui.screen {
        Screen::Main => "Main",
        Screen::Settings => "Settings",
    };

    // 作業セットと結果の件数を集計する。
    let info = format!(
        "Files: {} | Previews: {} | Results: {}",
        app.session.working_set.len(),
        app.session.working_set.live_previews(),
        app.session.results().count()
    );

    // エラーの有無でステータス文字列を切り替える。
    let status_text = if let Some(err) = &app.ui.error {
        format!("[{}] {} | ERROR: {}", screen_name, info, err)
    } else {
        format!("[{}] {} | {}", screen_name, info, app.ui.status)
    };

    let mut status_bar = Paragraph::new(status_text)
        .block(Block::default().borders(Borders::ALL).title("STATUS"))
        .wrap(Wrap { trim: true });

    // エラー時は赤色で強調表示する。
    if app.ui.error.is_some() {
        status_bar = status_bar.style(Style::default().fg(Color::Red));
    }

    status_bar
}

/// 現在画面に応じたヘルプ文字列を返す。
fn get_help_text(screen: &Screen, shortcuts: &Shortcuts) -> String {
    match screen {
        Screen::Main => format!(
            "{}: quit | {}: settings | {}: pane | {}/{}: navigate | {}: add | {}: remove | {}: clear | {}: preview | {}: run | {}: cancel | {}: save",
            format_keys(&shortcuts.main.quit),
            format_keys(&shortcuts.main.settings),
            format_keys(&shortcuts.main.next_pane),
            format_keys(&shortcuts.main.up),
            format_keys(&shortcuts.main.down),
            format_keys(&shortcuts.main.add),
            format_keys(&shortcuts.main.remove),
            format_keys(&shortcuts.main.clear),
            format_keys(&shortcuts.main.preview),
            format_keys(&shortcuts.main.run),
            format_keys(&shortcuts.main.cancel),
            format_keys(&shortcuts.main.save),
        ),
        Screen::Settings => format!(
            "{}: base URL | {}: download folder | {}: save | {}: cancel",
            format_keys(&shortcuts.settings.base_url),
            format_keys(&shortcuts.settings.output_dir),
            format_keys(&shortcuts.settings.save),
            format_keys(&shortcuts.settings.cancel)
        ),
    }
}

/// ショートカットキーの配列を表示用文字列に変換する。
fn format_keys(keys: &[String]) -> String {
    keys.join("/")
}

/// ジョブ状態を一覧表示用の短いラベルへ変換する。
fn status_str(s: &JobStatus, progress: u8) -> String {
    match s {
        JobStatus::Pending => format!("{progress:>3}%"),
        JobStatus::Succeeded => "Done".into(),
        JobStatus::Failed { .. } => "Failed".into(),
    }
}

/// バイト数を読みやすい単位へ変換する。
fn human_size(bytes: usize) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.1} {}", UNITS[unit])
    }
}
