//! レイアウト計算のヘルパー関数

use ratatui::prelude::*;

/// メインレイアウトの3つの領域
pub struct MainLayout {
    /// メディア・操作・結果パネルの領域
    pub body: Rect,
    /// HELPバーの領域
    pub help_bar: Rect,
    /// STATUSバーの領域
    pub status_bar: Rect,
}

/// ボディ部の4つの領域
pub struct BodyLayout {
    /// MEDIA一覧
    pub media: Rect,
    /// ACTIONS一覧
    pub actions: Rect,
    /// RESULTS一覧
    pub results: Rect,
    /// 通知ログ
    pub log: Rect,
}

/// メイン画面を分割（Body + HELP + STATUS）
pub fn create_main_layout(area: Rect) -> MainLayout {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Body
            Constraint::Length(3), // HELPバー
            Constraint::Length(3), // STATUSバー
        ])
        .split(area);

    MainLayout {
        body: chunks[0],
        help_bar: chunks[1],
        status_bar: chunks[2],
    }
}

/// Body領域を分割（左: MEDIA 45% / 中: ACTIONS 25% / 右: RESULTS + LOG 30%）
pub fn create_body_layout(area: Rect) -> BodyLayout {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(45),
            Constraint::Percentage(25),
            Constraint::Percentage(30),
        ])
        .split(area);

    // 右列は結果一覧とログを上下に分ける。
    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(55), Constraint::Percentage(45)])
        .split(columns[2]);

    BodyLayout {
        media: columns[0],
        actions: columns[1],
        results: right[0],
        log: right[1],
    }
}
