use ratatui::{
    layout::Rect,
    style::Color,
    style::Style,
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Frame,
};

pub fn draw_help(area: Rect, f: &mut Frame) {
    let p = Paragraph::new(vec![
        Line::from("Keybinds:"),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("Ctrl-Q", Style::default().fg(Color::Magenta)),
            Span::raw(" / "),
            Span::styled("Ctrl-C", Style::default().fg(Color::Magenta)),
            Span::raw("  Quit"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("Tab", Style::default().fg(Color::Magenta)),
            Span::raw("              Switch tabs"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("↑/↓", Style::default().fg(Color::Magenta)),
            Span::raw("              Select form field"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("Enter", Style::default().fg(Color::Magenta)),
            Span::raw("            Submit the active tab's action"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("Ctrl-R", Style::default().fg(Color::Magenta)),
            Span::raw("           Resume after manual verification"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("Ctrl-L", Style::default().fg(Color::Magenta)),
            Span::raw("           Poster login (Poster tab)"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("Ctrl-Y", Style::default().fg(Color::Magenta)),
            Span::raw("           Copy saved output path"),
        ]),
        Line::from(vec![
            Span::raw("  "),
            Span::styled("PgUp/PgDn", Style::default().fg(Color::Magenta)),
            Span::raw("        Scroll the job log"),
        ]),
        Line::from(""),
        Line::from("The job log mirrors the host's full history on every poll;"),
        Line::from("local notices (dispatch, poll errors) are appended between polls."),
    ])
    .block(Block::default().borders(Borders::ALL).title("Help"));
    f.render_widget(p, area);
}
