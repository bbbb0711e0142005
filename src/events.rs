//! 画面遷移用のUI状態と画面種別。

/// TUIで現在表示中の画面。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Screen {
    /// メイン画面（メディア一覧・操作・結果）。
    Main,
    /// 設定編集画面。
    Settings,
}

/// メイン画面でフォーカス中のパネル。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pane {
    /// 送信予定のメディア一覧。
    Media,
    /// 操作ボタン一覧。
    Actions,
    /// ダウンロード可能な結果一覧。
    Results,
}

impl Pane {
    /// 次のパネルへ循環する。
    pub fn next(self) -> Self {
        match self {
            Pane::Media => Pane::Actions,
            Pane::Actions => Pane::Results,
            Pane::Results => Pane::Media,
        }
    }
}

/// 描画側と共有するUI状態。
#[derive(Clone, Debug)]
pub struct UiState {
    /// 現在の画面。
    pub screen: Screen,
    /// フォーカス中のパネル。
    pub pane: Pane,
    /// メディア一覧の選択行。
    pub selected_media: usize,
    /// 操作一覧の選択行。
    pub selected_action: usize,
    /// 結果一覧の選択行。
    pub selected_result: usize,
    /// 右側パネルに表示する通知ログ。
    pub log: Vec<String>,
    /// 画面下部のステータス文言。
    pub status: String,
    /// エラーメッセージ（強調表示用）。
    pub error: Option<String>,
}

impl UiState {
    /// メイン画面の初期状態。
    pub fn new() -> Self {
        Self {
            screen: Screen::Main,
            pane: Pane::Media,
            selected_media: 0,
            selected_action: 0,
            selected_result: 0,
            log: vec![],
            status: "Ready".into(),
            error: None,
        }
    }

    /// 時刻付きで通知ログへ追加する。
    pub fn notify(&mut self, msg: impl Into<String>) {
        let msg = msg.into();
        let now = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("{now} {msg}"));
        self.status = msg;
    }
}

impl Default for UiState {
    fn default() -> Self {
        Self::new()
    }
}
