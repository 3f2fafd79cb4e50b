use shared::{
    domain::{RoundResult, TARGET_COUNT},
    protocol::{PageView, RoundSummary, RoundView},
};

const STYLE: &str = r#"
body { font-family: sans-serif; text-align: center; margin-top: 50px; }
.container { max-width: 600px; margin: auto; }
.game-box { background: #f4f4f4; padding: 20px; border-radius: 8px; }
.button { display: inline-block; font-size: 1.5em; padding: 20px 40px; cursor: pointer;
          border: none; border-radius: 5px; margin-top: 20px; width: 250px; color: white; }
.start-game { background-color: #17a2b8; }
.click-button { background-color: #007bff; }
.results-box { margin-top: 30px; }
.results-box h2 { border-bottom: 2px solid #eee; padding-bottom: 10px; }
.results-list { list-style-type: none; padding-left: 0; }
.results-list li { background: #eee; margin: 5px; padding: 10px; border-radius: 3px; text-align: left; }
.target-list { list-style-type: decimal; padding-left: 30px; text-align: left; }
.target-list li { margin: 10px 0; font-size: 1.2em; background-color: white; padding: 8px; border-radius: 4px; }
.target-list .completed { text-decoration: line-through; color: #888; }
table { width: 100%; margin-top: 20px; border-collapse: collapse; }
th, td { border: 1px solid #ccc; padding: 10px; }
th { background-color: #f0f0f0; }
"#;

pub(crate) fn game_page(view: &PageView) -> String {
    let mut body = String::new();
    body.push_str("<div class=\"game-box\"><form action=\"/\" method=\"POST\">");
    match &view.round {
        None => body.push_str(
            "<p>Press start and a single timer begins. Click 5 times to match the 5 targets.</p>\
             <button type=\"submit\" name=\"action\" value=\"start_game\" class=\"button start-game\">Start New Game</button>",
        ),
        Some(round) => write_round(&mut body, round),
    }
    body.push_str("</form></div>");

    if let Some(summary) = &view.last_summary {
        write_summary(&mut body, summary);
    }
    write_leaderboard(&mut body, &view.leaderboard);
    body.push_str("<a href=\"/reset\" style=\"margin-top: 20px; display:block;\">Clear Session</a>");

    page("5-Target Rhythm Game", &body)
}

fn write_round(out: &mut String, round: &RoundView) {
    if round.click_count >= TARGET_COUNT {
        out.push_str(
            "<h2>Saving your result failed</h2>\
             <button type=\"submit\" name=\"action\" value=\"click\" class=\"button click-button\">Retry Save</button>",
        );
    } else {
        out.push_str(&format!(
            "<h2>Click {} of {TARGET_COUNT}</h2><p>Timer is running!</p>\
             <button type=\"submit\" name=\"action\" value=\"click\" class=\"button click-button\">Click!</button>",
            round.click_count + 1
        ));
    }

    out.push_str("<h3>Targets:</h3><ul class=\"target-list\">");
    for (i, target) in round.targets.iter().enumerate() {
        match round.actuals.get(i) {
            Some(actual) => {
                out.push_str(&format!(
                    "<li class=\"completed\"><strong>Target: {target:.3}s</strong> (Your time: {actual:.3}s)</li>"
                ));
            }
            None => {
                out.push_str(&format!("<li><strong>Target: {target:.3}s</strong></li>"));
            }
        }
    }
    out.push_str("</ul>");
}

fn write_summary(out: &mut String, summary: &RoundSummary) {
    out.push_str(&format!(
        "<div class=\"results-box\"><h2>Last Game Results:</h2>\
         <h3>Average Difference: <strong>{:.3}s</strong></h3>\
         <table><tr><th>Target</th><th>Your Time</th><th>Difference</th></tr>",
        summary.average_difference
    ));
    for i in 0..TARGET_COUNT {
        out.push_str(&format!(
            "<tr><td>{:.3}s</td><td>{:.3}s</td><td>{:.3}s</td></tr>",
            summary.targets[i], summary.actuals[i], summary.differences[i]
        ));
    }
    out.push_str("</table></div>");
}

fn write_leaderboard(out: &mut String, results: &[RoundResult]) {
    out.push_str("<div class=\"results-box\"><h2>Leaderboard (Best Average Score)</h2>");
    if results.is_empty() {
        out.push_str("<p>No results saved yet. Play a game!</p></div>");
        return;
    }
    out.push_str("<ul class=\"results-list\">");
    for result in results {
        out.push_str(&format!(
            "<li><strong>{:.3}s (avg)</strong> <span style=\"font-size: 0.9em; color: #555;\">on {}</span></li>",
            result.average_difference,
            result.created_at.format("%Y-%m-%d %H:%M")
        ));
    }
    out.push_str("</ul></div>");
}

pub(crate) fn chat_page() -> String {
    let body = r#"
<div class="game-box">
  <ul id="log" class="results-list"></ul>
  <form id="chat">
    <input id="line" autocomplete="off" placeholder="Say something" style="width: 70%; font-size: 1.1em;">
    <button type="submit">Send</button>
  </form>
</div>
<script>
  const log = document.getElementById("log");
  const line = document.getElementById("line");
  const scheme = location.protocol === "https:" ? "wss" : "ws";
  const socket = new WebSocket(`${scheme}://${location.host}/ws`);
  socket.addEventListener("message", (event) => {
    const item = document.createElement("li");
    item.textContent = event.data;
    log.appendChild(item);
  });
  document.getElementById("chat").addEventListener("submit", (event) => {
    event.preventDefault();
    if (line.value) {
      socket.send(line.value);
      line.value = "";
    }
  });
</script>"#;
    page("Chat", body)
}

fn page(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html lang=\"en\"><head><meta charset=\"UTF-8\"><title>{title}</title>\
         <style>{STYLE}</style></head><body><div class=\"container\"><h1>{title}</h1>{body}</div></body></html>"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use shared::domain::ResultId;

    #[test]
    fn idle_page_offers_start_and_empty_leaderboard() {
        let html = game_page(&PageView {
            round: None,
            last_summary: None,
            leaderboard: Vec::new(),
        });
        assert!(html.contains("value=\"start_game\""));
        assert!(html.contains("No results saved yet"));
    }

    #[test]
    fn round_in_progress_strikes_through_clicked_targets() {
        let html = game_page(&PageView {
            round: Some(RoundView {
                targets: vec![5.0, 10.0, 20.0, 30.0, 50.0],
                actuals: vec![5.25],
                click_count: 1,
            }),
            last_summary: None,
            leaderboard: Vec::new(),
        });
        assert!(html.contains("Click 2 of 5"));
        assert!(html.contains("Target: 5.000s</strong> (Your time: 5.250s)"));
        assert!(html.contains("<li><strong>Target: 50.000s</strong></li>"));
    }

    #[test]
    fn summary_and_leaderboard_use_three_decimals() {
        let html = game_page(&PageView {
            round: None,
            last_summary: Some(RoundSummary {
                average_difference: 1.3,
                targets: [5.0, 10.0, 20.0, 30.0, 50.0],
                actuals: [5.5, 9.0, 22.0, 31.0, 48.0],
                differences: [0.5, 1.0, 2.0, 1.0, 2.0],
            }),
            leaderboard: vec![RoundResult {
                id: ResultId(1),
                created_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 12).unwrap(),
                average_difference: 1.3,
                targets: vec![5.0, 10.0, 20.0, 30.0, 50.0],
                actuals: vec![5.5, 9.0, 22.0, 31.0, 48.0],
            }],
        });
        assert!(html.contains("Average Difference: <strong>1.300s</strong>"));
        assert!(html.contains("<tr><td>20.000s</td><td>22.000s</td><td>2.000s</td></tr>"));
        assert!(html.contains("1.300s (avg)"));
        assert!(html.contains("on 2024-05-01 09:30"));
    }
}
