//! キー入力ハンドラー関数。

use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;

use crate::{
    events::{Pane, Screen},
    input::{InputBoxState, InputCallbackId},
    operation::Operation,
    shortcuts,
    worker::WorkerCmd,
};

use super::App;

/// キー入力を1件処理し、終了すべきならtrueを返す。
pub async fn handle_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    // 入力ボックスが開いていれば最優先で処理する。
    if app.input_box.is_some() {
        return handle_input_box_key(app, k).await;
    }

    // 画面ごとのハンドラへ委譲する。
    match app.ui.screen {
        Screen::Main => handle_main_key(app, k).await,
        Screen::Settings => handle_settings_key(app, k).await,
    }
}

/// Ctrl+Cかどうかを判定する。
pub fn is_ctrl_c(k: &KeyEvent) -> bool {
    k.modifiers.contains(KeyModifiers::CONTROL) && k.code == KeyCode::Char('c')
}

/// メイン画面のキー処理。
async fn handle_main_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = app.shortcuts.main.clone();

    if shortcuts::matches_shortcut(&k, &sc.quit) {
        return Ok(true);
    } else if shortcuts::matches_shortcut(&k, &sc.settings) {
        // 設定画面へ遷移し、編集バッファを更新する。
        reload_settings_buffers(app);
        app.ui.screen = Screen::Settings;
        app.ui.status = "Settings".into();
    } else if shortcuts::matches_shortcut(&k, &sc.next_pane) {
        app.ui.pane = app.ui.pane.next();
    } else if shortcuts::matches_shortcut(&k, &sc.down) {
        move_selection(app, 1);
    } else if shortcuts::matches_shortcut(&k, &sc.up) {
        move_selection(app, -1);
    } else if shortcuts::matches_shortcut(&k, &sc.add) {
        // 追加するファイル/フォルダのパス入力を開く。
        app.input_box = Some(InputBoxState::new(
            "Video file or folder:",
            "",
            InputCallbackId::AddMedia,
        ));
    } else if shortcuts::matches_shortcut(&k, &sc.remove) && app.ui.pane == Pane::Media {
        remove_selected_media(app);
    } else if shortcuts::matches_shortcut(&k, &sc.clear) && app.ui.pane == Pane::Media {
        clear_media(app);
    } else if shortcuts::matches_shortcut(&k, &sc.preview) && app.ui.pane == Pane::Media {
        open_preview(app);
    } else if shortcuts::matches_shortcut(&k, &sc.run) && app.ui.pane == Pane::Actions {
        submit_selected(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        cancel_pending(app).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.save) && app.ui.pane == Pane::Results {
        save_selected(app).await?;
    }

    Ok(false)
}

/// フォーカス中のパネルの選択行を移動する。
fn move_selection(app: &mut App, delta: isize) {
    let (len, sel) = match app.ui.pane {
        Pane::Media => (app.session.working_set.len(), &mut app.ui.selected_media),
        Pane::Actions => (Operation::ALL.len(), &mut app.ui.selected_action),
        Pane::Results => (app.result_rows().len(), &mut app.ui.selected_result),
    };
    if len == 0 {
        *sel = 0;
        return;
    }
    *sel = sel.saturating_add_signed(delta).min(len - 1);
}

/// 選択中のメディアを作業セットから外す（プレビューも解放される）。
fn remove_selected_media(app: &mut App) {
    let Some(id) = app
        .session
        .working_set
        .get(app.ui.selected_media)
        .map(|m| m.id)
    else {
        return;
    };
    if let Some(item) = app.session.working_set.remove_file(id) {
        app.ui.notify(format!("Removed {}", item.name));
    }
    // 末尾を消した場合は選択を詰める。
    let len = app.session.working_set.len();
    if app.ui.selected_media >= len {
        app.ui.selected_media = len.saturating_sub(1);
    }
}

/// 作業セットを空にする（全プレビューを解放する）。
fn clear_media(app: &mut App) {
    let n = app.session.working_set.len();
    if n == 0 {
        return;
    }
    app.session.working_set.clear();
    app.ui.selected_media = 0;
    app.ui.notify(format!("Cleared {n} file(s)"));
}

/// 選択中のメディアを既定のプレーヤーで開く。
fn open_preview(app: &mut App) {
    let Some(preview) = app.session.working_set.preview(app.ui.selected_media) else {
        return;
    };
    match preview.open() {
        Ok(()) => app.ui.status = format!("Opened {}", preview.uri()),
        Err(e) => app.ui.error = Some(format!("preview failed: {e}")),
    }
}

/// 選択中の操作を作業セットのスナップショットで実行する。
async fn submit_selected(app: &mut App) -> Result<()> {
    let op = app.selected_operation();
    if let Err(e) = app.session.begin(op) {
        app.ui.error = Some(e.to_string());
        return Ok(());
    }
    if app.session.working_set.is_empty() {
        tracing::warn!("{op}: submitting with no files");
    }
    let items = app.session.working_set.snapshot();
    app.worker_tx
        .send(WorkerCmd::Submit {
            operation: op,
            items,
        })
        .await?;
    app.ui.error = None;
    app.ui.notify(format!("{op}. Please wait..."));
    Ok(())
}

/// 実行中のジョブを中断する（操作パネルでは選択中の操作のみ）。
async fn cancel_pending(app: &mut App) -> Result<()> {
    let targets: Vec<Operation> = if app.ui.pane == Pane::Actions {
        let op = app.selected_operation();
        if app.session.is_pending(op) {
            vec![op]
        } else {
            vec![]
        }
    } else {
        app.session.pending().map(|j| j.operation).collect()
    };
    for op in targets {
        app.worker_tx.send(WorkerCmd::Cancel(op)).await?;
        app.ui.notify(format!("Cancelling {op}..."));
    }
    Ok(())
}

/// 選択中の結果をダウンロードフォルダへ保存する。
async fn save_selected(app: &mut App) -> Result<()> {
    let rows = app.result_rows();
    let Some(row) = rows.get(app.ui.selected_result) else {
        return Ok(());
    };
    let Some(payload) = app.session.result(row.operation).cloned() else {
        return Ok(());
    };
    app.worker_tx
        .send(WorkerCmd::Save {
            operation: row.operation,
            payload,
            target: row.target,
        })
        .await?;
    app.ui.status = format!("Saving {}...", row.file_name);
    Ok(())
}

/// 設定画面のキー処理。
async fn handle_settings_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let sc = &app.shortcuts.settings;

    if shortcuts::matches_shortcut(&k, &sc.cancel) {
        // 変更を破棄してメイン画面へ戻る。
        reload_settings_buffers(app);
        app.ui.screen = Screen::Main;
    } else if shortcuts::matches_shortcut(&k, &sc.save) {
        // 編集バッファを設定へ反映して保存する。
        app.cfg.server.base_url = app.base_url.trim().to_string();
        app.cfg.download.output_dir = PathBuf::from(app.output_dir.trim());
        app.cfg.save(&app.cfg_path)?;

        // Workerにも設定更新を通知する。
        app.worker_tx
            .send(WorkerCmd::UpdateConfig(app.cfg.clone()))
            .await?;
        app.ui.screen = Screen::Main;
        app.ui.status = "Saved settings".into();
    } else if shortcuts::matches_shortcut(&k, &sc.base_url) {
        app.input_box = Some(InputBoxState::new(
            "Server base URL:",
            app.base_url.clone(),
            InputCallbackId::SettingsBaseUrl,
        ));
    } else if shortcuts::matches_shortcut(&k, &sc.output_dir) {
        app.input_box = Some(InputBoxState::new(
            "Download folder:",
            app.output_dir.clone(),
            InputCallbackId::SettingsOutputDir,
        ));
    }

    Ok(false)
}

/// 入力ボックスのキー処理。
async fn handle_input_box_key(app: &mut App, k: KeyEvent) -> Result<bool> {
    let Some(input_state) = &mut app.input_box else {
        return Ok(false);
    };
    let sc = &app.shortcuts.input_box;

    // 入力ボックス中でもCtrl+Cで終了できるようにする。
    if is_ctrl_c(&k) {
        return Ok(true);
    }

    if shortcuts::matches_shortcut(&k, &sc.confirm) {
        // 閉じる前に値とコールバック種別を取り出す。
        let value = input_state.value.clone();
        let callback_id = input_state.callback_id.clone();
        app.input_box = None;
        apply_input_callback(app, callback_id, value).await?;
    } else if shortcuts::matches_shortcut(&k, &sc.cancel) {
        app.input_box = None;
    } else if shortcuts::matches_shortcut(&k, &sc.backspace) {
        input_state.backspace();
    } else if shortcuts::matches_shortcut(&k, &sc.delete) {
        input_state.delete();
    } else if shortcuts::matches_shortcut(&k, &sc.left) {
        input_state.move_left();
    } else if shortcuts::matches_shortcut(&k, &sc.right) {
        input_state.move_right();
    } else if shortcuts::matches_shortcut(&k, &sc.home) {
        input_state.move_home();
    } else if shortcuts::matches_shortcut(&k, &sc.end) {
        input_state.move_end();
    } else if shortcuts::matches_shortcut(&k, &sc.clear_line) {
        input_state.clear_line();
    } else if let KeyCode::Char(c) = k.code
        && !k.modifiers.contains(KeyModifiers::CONTROL)
    {
        // コントロールキーでない場合のみ挿入する。
        input_state.insert_char(c);
    }

    Ok(false)
}

/// 入力ボックスのコールバックを適用する。
async fn apply_input_callback(
    app: &mut App,
    callback_id: InputCallbackId,
    value: String,
) -> Result<()> {
    match callback_id {
        InputCallbackId::AddMedia => {
            let path = value.trim();
            if path.is_empty() {
                return Ok(());
            }
            // 読み込みはWorker側で行い、完了時にMediaLoadedが届く。
            app.worker_tx
                .send(WorkerCmd::LoadMedia(PathBuf::from(path)))
                .await?;
            app.ui.status = format!("Loading {path}...");
        }
        InputCallbackId::SettingsBaseUrl => app.base_url = value,
        InputCallbackId::SettingsOutputDir => app.output_dir = value,
    }
    Ok(())
}

/// 設定画面用の編集バッファを設定値から再読み込みする。
fn reload_settings_buffers(app: &mut App) {
    app.base_url = app.cfg.server.base_url.clone();
    app.output_dir = app.cfg.download.output_dir.display().to_string();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Config, media::MediaItem, shortcuts::Shortcuts, worker::WorkerEvent,
    };
    use tokio::sync::mpsc;

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::empty())
    }

    fn code(c: KeyCode) -> KeyEvent {
        KeyEvent::new(c, KeyModifiers::empty())
    }

    fn test_app() -> (App, mpsc::Receiver<WorkerCmd>, mpsc::Sender<WorkerEvent>) {
        let (tx_cmd, rx_cmd) = mpsc::channel(16);
        let (tx_ev, rx_ev) = mpsc::channel(16);
        let app = App::new(
            PathBuf::from("config.toml"),
            Config::default(),
            Shortcuts::default(),
            tx_cmd,
            rx_ev,
        );
        (app, rx_cmd, tx_ev)
    }

    #[tokio::test]
    async fn test_run_sends_snapshot_and_marks_pending() {
        // Enterで選択中の操作が送信され、二重送信は拒否されることを検証する。
        let (mut app, mut rx, _ev) = test_app();
        app.session
            .working_set
            .add_files([MediaItem::from_bytes("clip1.mp4", vec![1u8])]);
        app.ui.pane = Pane::Actions;

        handle_key(&mut app, code(KeyCode::Enter)).await.unwrap();
        let op = app.selected_operation();
        match rx.try_recv().unwrap() {
            WorkerCmd::Submit { operation, items } => {
                assert_eq!(operation, op);
                assert_eq!(items.len(), 1);
            }
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(app.session.is_pending(op));

        handle_key(&mut app, code(KeyCode::Enter)).await.unwrap();
        assert!(rx.try_recv().is_err());
        assert!(app.ui.error.as_deref().unwrap().contains("already running"));
    }

    #[tokio::test]
    async fn test_remove_selected_media() {
        // dキーで選択中のメディアが外れ、選択位置が詰められることを検証する。
        let (mut app, _rx, _ev) = test_app();
        app.session.working_set.add_files([
            MediaItem::from_bytes("a.mp4", vec![]),
            MediaItem::from_bytes("b.mp4", vec![]),
        ]);
        app.ui.selected_media = 1;
        handle_key(&mut app, key('d')).await.unwrap();
        assert_eq!(app.session.working_set.len(), 1);
        assert_eq!(app.session.working_set.get(0).unwrap().name, "a.mp4");
        assert_eq!(app.ui.selected_media, 0);
    }

    #[tokio::test]
    async fn test_clear_empties_working_set_and_releases_previews() {
        // xキーで作業セットが空になり、プレビューも解放されることを検証する。
        let (mut app, _rx, _ev) = test_app();
        app.session.working_set.add_files([
            MediaItem::from_bytes("a.mp4", vec![]),
            MediaItem::from_bytes("b.mp4", vec![]),
        ]);
        app.ui.selected_media = 1;
        assert_eq!(app.session.working_set.live_previews(), 2);

        handle_key(&mut app, key('x')).await.unwrap();
        assert!(app.session.working_set.is_empty());
        assert_eq!(app.session.working_set.live_previews(), 0);
        assert_eq!(app.ui.selected_media, 0);
        assert_eq!(app.ui.status, "Cleared 2 file(s)");
    }

    #[tokio::test]
    async fn test_add_media_via_input_box() {
        // aキー→パス入力→EnterでLoadMediaが送られることを検証する。
        let (mut app, mut rx, _ev) = test_app();
        handle_key(&mut app, key('a')).await.unwrap();
        for c in "/tmp/v".chars() {
            handle_key(&mut app, key(c)).await.unwrap();
        }
        handle_key(&mut app, code(KeyCode::Enter)).await.unwrap();

        assert!(app.input_box.is_none());
        match rx.try_recv().unwrap() {
            WorkerCmd::LoadMedia(p) => assert_eq!(p, PathBuf::from("/tmp/v")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cancel_targets_only_pending_jobs() {
        // cキーで実行中のジョブだけに中断要求が送られることを検証する。
        let (mut app, mut rx, _ev) = test_app();
        app.session.begin(Operation::GenerateAll).unwrap();
        handle_key(&mut app, key('c')).await.unwrap();
        match rx.try_recv().unwrap() {
            WorkerCmd::Cancel(op) => assert_eq!(op, Operation::GenerateAll),
            other => panic!("unexpected command: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_selection_is_clamped() {
        // 操作一覧の選択が範囲外に出ないことを検証する。
        let (mut app, _rx, _ev) = test_app();
        app.ui.pane = Pane::Actions;
        for _ in 0..10 {
            handle_key(&mut app, code(KeyCode::Down)).await.unwrap();
        }
        assert_eq!(app.ui.selected_action, Operation::ALL.len() - 1);
        handle_key(&mut app, key('k')).await.unwrap();
        assert_eq!(app.ui.selected_action, Operation::ALL.len() - 2);
    }
}
