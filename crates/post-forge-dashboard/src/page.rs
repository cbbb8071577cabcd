// crates/post-forge-dashboard/src/page.rs
// ============================================================================
// Module: Dashboard Page
// Description: Self-contained HTML page polling the JSON endpoints.
// Purpose: Give operators a live view with zero external assets.
// Dependencies: none
// ============================================================================

//! ## Overview
//! One embedded HTML document. It polls `/api/stats`, `/api/activity`, and
//! `/api/posts` on a fixed interval and renders them with inline styles and
//! scripts only, so the dashboard works without any network egress.

// ============================================================================
// SECTION: Template
// ============================================================================

/// Page template; `{{poll_ms}}` is substituted at render time.
const PAGE_TEMPLATE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Post Forge</title>
<style>
  body { font-family: ui-monospace, monospace; margin: 2rem; background: #111; color: #ddd; }
  h1 { font-size: 1.2rem; }
  section { margin-bottom: 1.5rem; }
  table { border-collapse: collapse; width: 100%; }
  td, th { border-bottom: 1px solid #333; padding: 0.3rem 0.6rem; text-align: left; }
  .num { text-align: right; }
  .flag { color: #e66; }
  #error { color: #e66; }
</style>
</head>
<body>
<h1>Post Forge pipeline dashboard</h1>
<div id="error"></div>
<section>
  <h2>Spend</h2>
  <table>
    <tr><th>Lifetime</th><th class="num" id="lifetime"></th></tr>
    <tr><th>Lifetime limit</th><th class="num" id="limit"></th></tr>
    <tr><th>Last 24h</th><th class="num" id="day"></th></tr>
    <tr><th>Current run</th><th class="num" id="run"></th></tr>
  </table>
</section>
<section>
  <h2>Last 24h outcomes</h2>
  <table id="counts"></table>
</section>
<section>
  <h2>In flight</h2>
  <table id="posts"></table>
</section>
<section>
  <h2>Activity</h2>
  <table id="activity"></table>
</section>
<script>
const POLL_MS = {{poll_ms}};
const usd = (v) => "$" + Number(v).toFixed(4);
async function getData(path) {
  const res = await fetch(path);
  const body = await res.json();
  if (!body.ok) throw new Error(body.error);
  return body.data;
}
function fillTable(id, rows) {
  document.getElementById(id).innerHTML =
    rows.map((r) => "<tr>" + r.map((c) => "<td>" + c + "</td>").join("") + "</tr>").join("");
}
async function refresh() {
  try {
    const stats = await getData("/api/stats");
    document.getElementById("lifetime").textContent = usd(stats.lifetime_spend);
    document.getElementById("limit").textContent = usd(stats.lifetime_limit);
    document.getElementById("day").textContent = usd(stats.spend_24h);
    document.getElementById("run").textContent = stats.current_run
      ? usd(stats.current_run.run_cost_usd) + " (" + stats.current_run.run_id + ")"
      : "idle";
    fillTable("counts", Object.entries(stats.last_24h));
    const posts = await getData("/api/posts");
    fillTable("posts", posts.map((p) => [p.post_id, p.title, p.last_stage, p.last_status]));
    const activity = await getData("/api/activity");
    fillTable("activity", activity.map((e) => [
      e.timestamp, e.action, e.post_id ?? "", e.cost_exhausted_flag ? "<span class=flag>cost</span>" : "",
    ]));
    document.getElementById("error").textContent = "";
  } catch (err) {
    document.getElementById("error").textContent = String(err);
  }
}
refresh();
setInterval(refresh, POLL_MS);
</script>
</body>
</html>
"#;

// ============================================================================
// SECTION: Rendering
// ============================================================================

/// Renders the page with the configured poll interval.
#[must_use]
pub fn render(poll_interval_secs: u64) -> String {
    let poll_ms = poll_interval_secs.saturating_mul(1_000).to_string();
    PAGE_TEMPLATE.replace("{{poll_ms}}", &poll_ms)
}
