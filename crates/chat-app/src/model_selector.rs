use gpui::prelude::FluentBuilder;
use gpui::*;
use gpui_component::{
    ActiveTheme, Icon, IconName, Selectable, Sizable,
    button::{Button, ButtonVariants},
    h_flex, v_flex,
};
use parlor_llm::{CatalogSource, Model, ModelCatalog, registry_models};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSelected {
    pub model_id: String,
}

/// Entries shown in the dropdown and the selected tag.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ModelMenu {
    selected: String,
    entries: Vec<Model>,
    source: CatalogSource,
}

impl ModelMenu {
    fn new(selected: String) -> Self {
        let mut menu = Self {
            selected,
            entries: Vec::new(),
            source: CatalogSource::Registry,
        };
        menu.replace_entries(registry_models(), CatalogSource::Registry);
        menu
    }

    /// An empty listing falls back to the registry. The selection stays
    /// listed even when the server does not report it, so a model that is
    /// still being pulled keeps its place.
    fn replace_entries(&mut self, entries: Vec<Model>, source: CatalogSource) {
        let (mut entries, source) = if entries.is_empty() {
            (registry_models(), CatalogSource::Registry)
        } else {
            (entries, source)
        };

        if !self.selected.is_empty() && !entries.iter().any(|model| model.id == self.selected) {
            let selected = registry_models()
                .into_iter()
                .find(|model| model.id == self.selected)
                .unwrap_or_else(|| Model::from_id(self.selected.clone()));
            entries.insert(0, selected);
        }

        self.entries = entries;
        self.source = source;
    }

    fn selected_label(&self) -> &str {
        self.entries
            .iter()
            .find(|model| model.id == self.selected)
            .map_or(self.selected.as_str(), |model| model.name.as_str())
    }

    fn heading(&self) -> &'static str {
        match self.source {
            CatalogSource::Server | CatalogSource::Cached => "Local models",
            CatalogSource::Stale => "Local models (last known)",
            CatalogSource::Registry => "Built-in models",
        }
    }
}

fn entry_caption(model: &Model) -> String {
    match &model.description {
        Some(description) => format!("{} · {description}", model.id),
        None => model.id.clone(),
    }
}

/// Header dropdown for picking the model the next exchange uses.
pub struct ModelSelector {
    menu: ModelMenu,
    is_open: bool,
}

impl EventEmitter<ModelSelected> for ModelSelector {}

impl ModelSelector {
    pub fn new(current_model_id: impl Into<String>) -> Self {
        Self {
            menu: ModelMenu::new(current_model_id.into()),
            is_open: false,
        }
    }

    pub fn set_model_id(&mut self, model_id: impl Into<String>, cx: &mut Context<Self>) {
        self.menu.selected = model_id.into();
        let entries = std::mem::take(&mut self.menu.entries);
        let source = self.menu.source;
        self.menu.replace_entries(entries, source);
        cx.notify();
    }

    pub fn set_catalog(&mut self, catalog: ModelCatalog, cx: &mut Context<Self>) {
        self.menu.replace_entries(catalog.models, catalog.source);
        cx.notify();
    }

    fn toggle_open(&mut self, _: &ClickEvent, _window: &mut Window, cx: &mut Context<Self>) {
        self.is_open = !self.is_open;
        cx.notify();
    }

    fn pick(&mut self, model_id: String, cx: &mut Context<Self>) {
        self.is_open = false;
        if model_id != self.menu.selected {
            tracing::info!(model_id = %model_id, "model selected");
            self.menu.selected = model_id.clone();
            cx.emit(ModelSelected { model_id });
        }
        cx.notify();
    }

    fn render_entry(&self, model: &Model, cx: &Context<Self>) -> AnyElement {
        let theme = cx.theme();
        let model_id = model.id.clone();
        let is_selected = model.id == self.menu.selected;

        h_flex()
            .id(ElementId::Name(format!("model-option-{model_id}").into()))
            .px_3()
            .py_2()
            .gap_2()
            .items_center()
            .justify_between()
            .cursor_pointer()
            .map(|row| {
                if is_selected {
                    row.bg(theme.primary.opacity(0.1))
                } else {
                    row.hover(|row| row.bg(theme.muted.opacity(0.5)))
                }
            })
            .on_click(cx.listener(move |this, _, _window, cx| this.pick(model_id.clone(), cx)))
            .child(
                v_flex()
                    .flex_1()
                    .gap_1()
                    .child(
                        div()
                            .text_sm()
                            .text_color(theme.foreground)
                            .child(model.name.clone()),
                    )
                    .child(
                        div()
                            .text_xs()
                            .text_color(theme.muted_foreground)
                            .child(entry_caption(model)),
                    ),
            )
            .when(is_selected, |row| {
                row.child(
                    Icon::new(IconName::Check)
                        .size(px(16.))
                        .text_color(theme.primary),
                )
            })
            .into_any_element()
    }
}

impl Render for ModelSelector {
    fn render(&mut self, _window: &mut Window, cx: &mut Context<Self>) -> impl IntoElement {
        let theme = cx.theme();
        let entries = self
            .menu
            .entries
            .iter()
            .map(|model| self.render_entry(model, cx))
            .collect::<Vec<_>>();

        h_flex()
            .id("model-selector")
            .relative()
            .child(
                Button::new("model-selector-button")
                    .ghost()
                    .small()
                    .icon(IconName::ChevronDown)
                    .child(self.menu.selected_label().to_string())
                    .selected(self.is_open)
                    .on_click(cx.listener(Self::toggle_open)),
            )
            .when(self.is_open, |selector| {
                selector.child(
                    v_flex()
                        .id("model-selector-dropdown")
                        .absolute()
                        .top(px(32.))
                        .right_0()
                        .w(px(280.))
                        .max_h(px(360.))
                        .overflow_y_scroll()
                        .py_1()
                        .rounded_md()
                        .shadow_md()
                        .border_1()
                        .border_color(theme.border)
                        .bg(theme.popover)
                        .child(
                            div()
                                .px_3()
                                .py_2()
                                .border_b_1()
                                .border_color(theme.border)
                                .text_sm()
                                .font_weight(FontWeight::SEMIBOLD)
                                .text_color(theme.foreground)
                                .child(self.menu.heading()),
                        )
                        .children(entries),
                )
            })
    }
}
