use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, TableState},
    Frame,
};

use deudores_core::models::{Debtor, DebtorSortColumn};
use deudores_core::Phase;

use crate::app::{App, AppState, LoginFocus};
use crate::form::FormField;

use super::styles;

const PLACEHOLDER: &str = "-";

pub fn render(frame: &mut Frame, app: &App) {
    let now = Instant::now();

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Title bar
            Constraint::Length(2), // Filter bar
            Constraint::Min(10),   // Main content
            Constraint::Length(2), // Status bar
        ])
        .split(frame.area());

    render_title_bar(frame, app, chunks[0]);
    render_filter_bar(frame, app, chunks[1]);
    render_main_content(frame, app, chunks[2]);
    render_status_bar(frame, app, chunks[3], now);

    match app.state {
        AppState::ShowingHelp => render_help_overlay(frame),
        AppState::ShowingHistory => render_history_overlay(frame, app),
        AppState::LoggingIn => render_login_overlay(frame, app),
        AppState::ConfirmingQuit => render_confirm_overlay(
            frame,
            "¿Seguro que quieres salir?",
            " para salir, ",
        ),
        AppState::ConfirmingDelete => render_confirm_overlay(
            frame,
            "¿Eliminar el deudor seleccionado?",
            " para eliminar, ",
        ),
        AppState::ConfirmingPresence => render_presence_overlay(frame, app, now),
        AppState::EnteringPayment => render_prompt_overlay(
            frame,
            "Registrar pago",
            "Monto:",
            &app.payment_input,
        ),
        AppState::EditingFilter(field) => {
            render_prompt_overlay(frame, "Filtro", field.label(), &app.filter_input)
        }
        AppState::EditingDebtor => render_form_overlay(frame, app),
        AppState::Normal | AppState::Searching | AppState::Quitting => {}
    }
}

fn render_title_bar(frame: &mut Frame, app: &App, area: Rect) {
    let title = "  Gestión de Deudores";
    let user = app
        .session
        .username()
        .map(|u| format!("{}  ", u))
        .unwrap_or_default();
    let help_hint = "[?] Ayuda";

    let title_line = Line::from(vec![
        Span::styled(title, styles::title_style()),
        Span::raw(" ".repeat(
            (area.width as usize)
                .saturating_sub(title.chars().count() + user.chars().count() + help_hint.len() + 4),
        )),
        Span::styled(user, styles::highlight_style()),
        Span::styled(help_hint, styles::muted_style()),
    ]);

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(title_line).block(block), area);
}

fn render_filter_bar(frame: &mut Frame, app: &App, area: Rect) {
    let filter = &app.filter;
    let searching = app.state == AppState::Searching;

    let mut spans = vec![
        Span::styled(" Estado: ", styles::muted_style()),
        Span::styled(filter.status.label(), styles::highlight_style()),
        Span::styled("  Nombre: ", styles::muted_style()),
    ];

    let name = if searching {
        format!("{}▌", filter.name)
    } else if filter.name.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        filter.name.clone()
    };
    spans.push(Span::styled(
        name,
        if searching { styles::selected_style() } else { styles::list_item_style() },
    ));

    if let Some(date) = filter.started_by {
        spans.push(Span::styled("  Inicio ≤ ", styles::muted_style()));
        spans.push(Span::raw(format_date(Some(date))));
    }
    if filter.min_pending > 0.0 || filter.max_pending.is_some() {
        spans.push(Span::styled("  Pendiente: ", styles::muted_style()));
        spans.push(Span::raw(format!(
            "{} - {}",
            format_amount(filter.min_pending),
            filter.max_pending.map(format_amount).unwrap_or_else(|| "∞".to_string())
        )));
    }

    let counts = app.status_counts();
    spans.push(Span::styled(
        format!("   Activos: {}  No activos: {}", counts.active, counts.inactive),
        styles::muted_style(),
    ));

    let block = Block::default()
        .borders(Borders::BOTTOM)
        .border_style(styles::muted_style());

    frame.render_widget(Paragraph::new(Line::from(spans)).block(block), area);
}

fn render_main_content(frame: &mut Frame, app: &App, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(area);

    render_debtor_table(frame, app, chunks[0]);
    render_debtor_detail(frame, app.selected_debtor(), chunks[1]);
}

fn render_debtor_table(frame: &mut Frame, app: &App, area: Rect) {
    let visible = app.visible_debtors();

    let sort_indicator = |col: DebtorSortColumn| {
        if app.sort_column == col {
            if app.sort_ascending { " ▲" } else { " ▼" }
        } else {
            ""
        }
    };

    let header = Row::new([
        Cell::from(format!("Nombre{}", sort_indicator(DebtorSortColumn::Name))),
        Cell::from(format!("Pendiente{}", sort_indicator(DebtorSortColumn::Pending))),
        Cell::from("Cuota"),
        Cell::from(format!("Inicio{}", sort_indicator(DebtorSortColumn::StartDate))),
        Cell::from(format!("Próximo pago{}", sort_indicator(DebtorSortColumn::NextPayment))),
        Cell::from("Estado"),
    ])
    .style(styles::title_style())
    .height(1);

    let rows: Vec<Row> = visible
        .iter()
        .map(|debtor| {
            let state = if debtor.collected {
                "Cobrado".to_string()
            } else {
                debtor.status_label().to_string()
            };
            Row::new(vec![
                Cell::from(debtor.name.clone()),
                Cell::from(format!("{:>10}", format_amount(debtor.pending_amount))),
                Cell::from(format!("{:>8}", format_amount(debtor.weekly_installment))),
                Cell::from(format_date(debtor.start_date)),
                Cell::from(format_date(debtor.next_payment_date)),
                Cell::from(state),
            ])
            .style(styles::debtor_row_style(debtor.is_active()))
        })
        .collect();

    let widths = [
        Constraint::Fill(3),
        Constraint::Length(12),
        Constraint::Length(9),
        Constraint::Length(11),
        Constraint::Length(14),
        Constraint::Length(10),
    ];

    let title = if app.loading {
        format!(" Deudores ({}) - cargando... ", visible.len())
    } else {
        format!(" Deudores ({}) - [n]ombre [p]endiente [i]nicio [x] próximo ", visible.len())
    };

    let table = Table::new(rows, widths)
        .header(header)
        .block(
            Block::default()
                .title(title)
                .title_style(styles::muted_style())
                .borders(Borders::ALL)
                .border_style(styles::border_style(true)),
        )
        .row_highlight_style(styles::selected_style());

    let mut state = TableState::default();
    if !visible.is_empty() {
        state.select(Some(app.selection));
    }

    frame.render_stateful_widget(table, area, &mut state);
}

fn render_debtor_detail(frame: &mut Frame, selected: Option<&Debtor>, area: Rect) {
    let lines = match selected {
        Some(debtor) => {
            let field = |label: &'static str, value: String| {
                Line::from(vec![Span::styled(label, styles::muted_style()), Span::raw(value)])
            };

            let mut lines = vec![
                Line::from(Span::styled(debtor.name.clone(), styles::title_style())),
                Line::from(""),
                field("Monto inicial:  ", format_amount(debtor.initial_amount)),
                field("Cuota semanal:  ", format_amount(debtor.weekly_installment)),
                field("Pendiente:      ", format_amount(debtor.pending_amount)),
                field("Total pagado:   ", format_amount(debtor.total_paid())),
                Line::from(""),
                field("Inicio:         ", format_date(debtor.start_date)),
                field("Último pago:    ", format_date(debtor.last_payment_date)),
                field("Próximo pago:   ", format_date(debtor.next_payment_date)),
                Line::from(""),
            ];

            let status_style = if debtor.is_active() {
                styles::highlight_style()
            } else {
                styles::success_style()
            };
            lines.push(Line::from(vec![
                Span::styled("Estado:         ", styles::muted_style()),
                Span::styled(debtor.status_label(), status_style),
                Span::raw(if debtor.collected { " (cobrado)" } else { "" }),
            ]));
            lines.push(field("Pagos:          ", debtor.payments.len().to_string()));
            lines
        }
        None => vec![Line::from(Span::styled(
            "Sin deudores para mostrar",
            styles::muted_style(),
        ))],
    };

    let block = Block::default()
        .title(" Detalle - [h]istorial ")
        .title_style(styles::muted_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(false));

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

fn render_status_bar(frame: &mut Frame, app: &App, area: Rect, now: Instant) {
    let left_text = match app.status_message {
        Some(ref msg) => format!(" {} ", msg),
        None => " Listo ".to_string(),
    };

    let (countdown, urgent) = match app.monitor.as_ref() {
        Some(monitor) => {
            let remaining = monitor.remaining(now).unwrap_or_default();
            let urgent = monitor.phase() == Phase::PendingConfirmation;
            (format!(" Inactividad {} ", format_countdown(remaining)), urgent)
        }
        None => (String::new(), false),
    };

    let expiry = app
        .session
        .minutes_until_expiry()
        .map(|m| format!("| Token {} min ", m))
        .unwrap_or_default();

    let shortcuts = "| [L]ogout [q] salir ";

    let used = left_text.chars().count()
        + countdown.chars().count()
        + expiry.chars().count()
        + shortcuts.len();
    let padding = (area.width as usize).saturating_sub(used);

    let line = Line::from(vec![
        Span::styled(left_text, styles::muted_style()),
        Span::raw(" ".repeat(padding)),
        Span::styled(countdown, styles::countdown_style(urgent)),
        Span::styled(expiry, styles::muted_style()),
        Span::styled(shortcuts, styles::muted_style()),
    ]);

    frame.render_widget(Paragraph::new(line).style(styles::status_bar_style()), area);
}

fn help_line(key: &'static str, desc: &'static str) -> Line<'static> {
    Line::from(vec![
        Span::styled(key, styles::help_key_style()),
        Span::styled(desc, styles::help_desc_style()),
    ])
}

fn render_help_overlay(frame: &mut Frame) {
    let area = centered_rect_fixed(56, 26, frame.area());
    frame.render_widget(Clear, area);

    let version = env!("CARGO_PKG_VERSION");

    let lines = vec![
        Line::from(Span::styled("  Gestión de Deudores", styles::title_style())),
        Line::from(Span::styled(format!("  versión {}", version), styles::muted_style())),
        Line::from(""),
        Line::from(Span::styled(" Navegación", styles::highlight_style())),
        help_line("  ↑/↓ PgUp/PgDn ", "Mover la selección"),
        help_line("  h / Enter     ", "Historial de pagos"),
        help_line("  Esc           ", "Volver"),
        Line::from(""),
        Line::from(Span::styled(" Filtros y orden", styles::highlight_style())),
        help_line("  /             ", "Buscar por nombre"),
        help_line("  s             ", "Estado: todos, activos, no activos"),
        help_line("  d             ", "Iniciados hasta una fecha"),
        help_line("  < / >         ", "Pendiente mínimo / máximo"),
        help_line("  c             ", "Quitar filtros"),
        help_line("  n/p/i/x       ", "Ordenar por nombre/pendiente/inicio/próximo"),
        Line::from(""),
        Line::from(Span::styled(" Acciones", styles::highlight_style())),
        help_line("  a             ", "Nuevo deudor"),
        help_line("  $             ", "Registrar pago"),
        help_line("  m / M         ", "Marcar cobrado / cobrar todos los saldados"),
        help_line("  Supr          ", "Eliminar deudor"),
        help_line("  e             ", "Exportar CSV"),
        help_line("  u             ", "Actualizar"),
        help_line("  L / q         ", "Cerrar sesión / salir"),
        Line::from(""),
        Line::from(Span::styled("   Pulsa ? o Esc para cerrar", styles::muted_style())),
    ];

    frame.render_widget(Paragraph::new(lines).block(overlay_block("")), area);
}

fn render_history_overlay(frame: &mut Frame, app: &App) {
    let area = centered_rect_fixed(50, 20, frame.area());
    frame.render_widget(Clear, area);

    let Some(debtor) = app.selected_debtor() else {
        return;
    };

    let payments = debtor.payments_newest_first();
    let rows: Vec<Row> = payments
        .iter()
        .map(|p| {
            Row::new(vec![
                Cell::from(format_date(p.date)),
                Cell::from(format!("{:>12}", format_amount(p.amount))),
            ])
        })
        .collect();

    let title = format!(" {} - {} pagos ", debtor.name, payments.len());
    let table = Table::new(rows, [Constraint::Length(12), Constraint::Fill(1)])
        .header(Row::new(["Fecha", "Monto"]).style(styles::title_style()))
        .block(overlay_block(&title))
        .row_highlight_style(styles::selected_style());

    let mut state = TableState::default();
    if !payments.is_empty() {
        state.select(Some(app.history_selection.min(payments.len() - 1)));
    }

    frame.render_stateful_widget(table, area, &mut state);
}

fn render_login_overlay(frame: &mut Frame, app: &App) {
    let height = if app.login_error.is_some() { 12 } else { 10 };
    let area = centered_rect_fixed(50, height, frame.area());
    frame.render_widget(Clear, area);

    let field_style = |focused: bool| {
        if focused {
            styles::selected_style()
        } else {
            styles::list_item_style()
        }
    };

    let mut lines = vec![
        Line::from(Span::styled("       Gestión de Deudores", styles::title_style())),
        Line::from(Span::styled("       Iniciar sesión", styles::muted_style())),
        Line::from(""),
    ];

    let username_focused = app.login_focus == LoginFocus::Username;
    lines.push(Line::from(vec![
        Span::styled("  Usuario:    [", styles::muted_style()),
        Span::styled(
            format!("{:<20}{}", app.login_username, if username_focused { "▌" } else { "" }),
            field_style(username_focused),
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    let password_focused = app.login_focus == LoginFocus::Password;
    let masked = "*".repeat(app.login_password.chars().count().min(20));
    lines.push(Line::from(vec![
        Span::styled("  Contraseña: [", styles::muted_style()),
        Span::styled(
            format!("{:<20}{}", masked, if password_focused { "▌" } else { "" }),
            field_style(password_focused),
        ),
        Span::styled("]", styles::muted_style()),
    ]));

    let button_focused = app.login_focus == LoginFocus::Button;
    lines.push(Line::from(""));
    lines.push(Line::from(vec![
        Span::raw("            ["),
        Span::styled(
            if button_focused { " ▶ Entrar ◀ " } else { "   Entrar   " },
            field_style(button_focused),
        ),
        Span::raw("]"),
    ]));

    if let Some(ref error) = app.login_error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!(" {}", error), styles::error_style())));
    }

    frame.render_widget(Paragraph::new(lines).block(overlay_block("")), area);
}

fn render_presence_overlay(frame: &mut Frame, app: &App, now: Instant) {
    let area = centered_rect_fixed(50, 9, frame.area());
    frame.render_widget(Clear, area);

    let remaining = app
        .monitor
        .as_ref()
        .and_then(|m| m.remaining(now))
        .unwrap_or_default();

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled("   ¿Sigues ahí?", styles::highlight_style())),
        Line::from(""),
        Line::from(Span::styled(
            format!("   La sesión se cerrará en {} s.", remaining.as_millis().div_ceil(1000)),
            styles::error_style(),
        )),
        Line::from(""),
        Line::from(vec![
            Span::styled("   [Enter]", styles::help_key_style()),
            Span::styled(" continuar   ", styles::muted_style()),
            Span::styled("[L]", styles::help_key_style()),
            Span::styled(" cerrar sesión", styles::muted_style()),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(overlay_block(" Inactividad ")), area);
}

fn render_confirm_overlay(frame: &mut Frame, question: &str, accept: &'static str) {
    let area = centered_rect_fixed(46, 7, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(Span::styled(format!("   {}", question), styles::highlight_style())),
        Line::from(""),
        Line::from(vec![
            Span::styled("   Pulsa ", styles::muted_style()),
            Span::styled("[S]", styles::help_key_style()),
            Span::styled(accept, styles::muted_style()),
            Span::styled("[N]", styles::help_key_style()),
            Span::styled(" para cancelar", styles::muted_style()),
        ]),
    ];

    frame.render_widget(Paragraph::new(lines).block(overlay_block("")), area);
}

fn render_prompt_overlay(frame: &mut Frame, title: &str, label: &str, value: &str) {
    let area = centered_rect_fixed(50, 6, frame.area());
    frame.render_widget(Clear, area);

    let lines = vec![
        Line::from(""),
        Line::from(vec![
            Span::styled(format!("  {} ", label), styles::muted_style()),
            Span::styled(format!("{}▌", value), styles::selected_style()),
        ]),
        Line::from(""),
        Line::from(Span::styled("  [Enter] aceptar  [Esc] cancelar", styles::muted_style())),
    ];

    frame.render_widget(Paragraph::new(lines).block(overlay_block(&format!(" {} ", title))), area);
}

fn render_form_overlay(frame: &mut Frame, app: &App) {
    let height = FormField::ALL.len() as u16 + if app.form.error.is_some() { 8 } else { 6 };
    let area = centered_rect_fixed(60, height, frame.area());
    frame.render_widget(Clear, area);

    let mut lines = vec![Line::from("")];
    for field in FormField::ALL {
        let focused = app.form.focus() == field;
        let style = if focused {
            styles::selected_style()
        } else {
            styles::list_item_style()
        };
        lines.push(Line::from(vec![
            Span::styled(format!("  {:<20}", field.label()), styles::muted_style()),
            Span::styled(
                format!("{}{}", app.form.value(field), if focused { "▌" } else { "" }),
                style,
            ),
        ]));
    }

    lines.push(Line::from(""));
    lines.push(Line::from(Span::styled(
        "  [Tab] siguiente  [Enter] guardar  [Esc] cancelar",
        styles::muted_style(),
    )));

    if let Some(ref error) = app.form.error {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(format!("  {}", error), styles::error_style())));
    }

    frame.render_widget(Paragraph::new(lines).block(overlay_block(" Nuevo deudor ")), area);
}

fn overlay_block(title: &str) -> Block<'_> {
    Block::default()
        .title(title)
        .title_style(styles::title_style())
        .borders(Borders::ALL)
        .border_style(styles::border_style(true))
        .style(Style::default())
}

/// Create a centered rectangle with fixed dimensions
fn centered_rect_fixed(width: u16, height: u16, r: Rect) -> Rect {
    let x = r.x + (r.width.saturating_sub(width)) / 2;
    let y = r.y + (r.height.saturating_sub(height)) / 2;
    Rect::new(x, y, width.min(r.width), height.min(r.height))
}

fn format_date(date: Option<NaiveDate>) -> String {
    date.map(|d| d.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|| PLACEHOLDER.to_string())
}

fn format_amount(amount: f64) -> String {
    format!("${:.2}", amount)
}

/// `m:ss`, rounded up so the display never shows 0:00 while time remains
fn format_countdown(remaining: Duration) -> String {
    let secs = remaining.as_millis().div_ceil(1000) as u64;
    format!("{}:{:02}", secs / 60, secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_countdown_rounds_up() {
        assert_eq!(format_countdown(Duration::from_secs(300)), "5:00");
        assert_eq!(format_countdown(Duration::from_millis(2001)), "0:03");
        assert_eq!(format_countdown(Duration::ZERO), "0:00");
    }

    #[test]
    fn test_format_helpers() {
        assert_eq!(format_amount(1500.5), "$1500.50");
        assert_eq!(format_date(NaiveDate::from_ymd_opt(2024, 3, 9)), "09/03/2024");
        assert_eq!(format_date(None), "-");
    }

    #[test]
    fn test_centered_rect_fits_small_area() {
        let rect = centered_rect_fixed(50, 10, Rect::new(0, 0, 40, 8));
        assert_eq!(rect, Rect::new(0, 0, 40, 8));

        let rect = centered_rect_fixed(10, 4, Rect::new(0, 0, 30, 10));
        assert_eq!(rect, Rect::new(10, 3, 10, 4));
    }
}
