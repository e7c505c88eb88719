use gpui::*;
use gpui_component::Root;
use gpui_component::notification::NotificationList;
use tracing_subscriber::EnvFilter;

use parlor::app::{NewChat, ParlorShell, Quit};
use parlor::settings::{SettingsState, SettingsStore};

const DEFAULT_LOG_FILTER: &str = "info,parlor=debug,parlor_llm=debug";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    let app = Application::new().with_assets(gpui_component_assets::Assets);

    app.run(|cx| {
        gpui_tokio_bridge::init(cx);

        // Must run before any Root is created.
        gpui_component::init(cx);

        let settings_store = SettingsStore::load();
        tracing::info!(
            path = ?settings_store.config_path(),
            "loaded settings"
        );
        settings_store.settings().apply_theme(None, cx);
        let settings_state = SettingsState::new(settings_store, cx);

        cx.on_action(|_: &Quit, cx| {
            cx.quit();
        });

        cx.bind_keys([
            KeyBinding::new("cmd-q", Quit, None),
            KeyBinding::new("cmd-n", NewChat, None),
        ]);

        cx.spawn(async move |cx| {
            cx.update(|cx| {
                let options = WindowOptions {
                    window_bounds: Some(WindowBounds::Windowed(Bounds::centered(
                        None,
                        size(px(960.), px(720.)),
                        cx,
                    ))),
                    titlebar: Some(TitlebarOptions {
                        title: Some(parlor::app::APP_TITLE.into()),
                        appears_transparent: true,
                        traffic_light_position: Some(point(px(9.), px(12.))),
                    }),
                    #[cfg(any(target_os = "linux", target_os = "freebsd"))]
                    window_decorations: Some(WindowDecorations::Client),
                    #[cfg(not(any(target_os = "linux", target_os = "freebsd")))]
                    window_decorations: None,
                    ..Default::default()
                };

                let opened = cx.open_window(options, |window, cx| {
                    let notification_list = cx.new(|cx| NotificationList::new(window, cx));
                    let shell = cx.new(|cx| {
                        ParlorShell::new(notification_list, settings_state, window, cx)
                    });
                    cx.new(|cx| Root::new(shell, window, cx))
                });

                match opened {
                    Ok(_) => cx.activate(true),
                    Err(error) => {
                        tracing::error!("failed to open main window: {error}");
                        cx.quit();
                    }
                }
            })
        })
        .detach();
    });
}
