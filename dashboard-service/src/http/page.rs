use axum::response::Html;

const PLOTLY_JS: &str = "https://cdn.plot.ly/plotly-2.12.1.min.js";

const CARDS: [(&str, &str); 8] = [
    ("plant_efficiency", "Plant Efficiency"),
    ("methane_conc", "Methane Concentration"),
    ("gas_yesterday", "Gas Yesterday"),
    ("gas_today", "Gas Today"),
    ("live_gas_flow", "Live Gas Flow"),
    ("total_gas", "Total Gas"),
    ("battery_charged", "Battery Charged"),
    ("temperature", "Temperature"),
];

const SCRIPT: &str = r#"
const select = document.getElementById('device-input');
const tableDiv = document.getElementById('device-data-table');
let page = 0;

async function getJson(url) {
  const resp = await fetch(url);
  if (!resp.ok) throw new Error(await resp.text());
  return resp.json();
}

function deviceParam() {
  return 'device_id=' + encodeURIComponent(select.value);
}

async function loadDevices() {
  const { devices } = await getJson('/api/devices');
  for (const id of devices) {
    const opt = document.createElement('option');
    opt.value = id;
    opt.textContent = id;
    select.appendChild(opt);
  }
}

async function loadCards() {
  const cards = await getJson('/api/summary?' + deviceParam());
  for (const [id, text] of Object.entries(cards)) {
    const el = document.getElementById(id);
    if (el) el.textContent = text;
  }
}

async function loadChart() {
  const fig = await getJson('/api/chart?' + deviceParam());
  Plotly.react('gas-production-graph', fig.data || [], fig.layout || {});
}

function cellRow(tag, values) {
  const tr = document.createElement('tr');
  for (const v of values) {
    const cell = document.createElement(tag);
    cell.textContent = v ?? '';
    tr.appendChild(cell);
  }
  return tr;
}

function pageButton(label, onClick) {
  const btn = document.createElement('button');
  btn.textContent = label;
  btn.onclick = onClick;
  return btn;
}

async function loadTable() {
  try {
    const t = await getJson('/api/table?' + deviceParam() + '&page=' + page);
    if (t.message) { tableDiv.textContent = t.message; return; }
    const table = document.createElement('table');
    table.appendChild(cellRow('th', t.columns));
    for (const r of t.rows) table.appendChild(cellRow('td', r));
    const pages = Math.max(1, Math.ceil(t.total_rows / t.page_size));
    const nav = document.createElement('p');
    nav.append(
      pageButton('<', () => { if (page > 0) { page--; loadTable(); } }),
      ' page ' + (t.page + 1) + ' / ' + pages + ' ',
      pageButton('>', () => { if (page + 1 < pages) { page++; loadTable(); } }),
    );
    tableDiv.replaceChildren(table, nav);
  } catch (e) {
    tableDiv.textContent = e.message;
  }
}

select.addEventListener('change', () => {
  page = 0;
  loadCards();
  loadChart();
  loadTable();
});

document.getElementById('export-btn').addEventListener('click', () => {
  if (!select.value) return;
  window.location = '/download?' + deviceParam();
});

loadDevices().then(loadCards);
"#;

fn render() -> String {
    let cards: String = CARDS
        .iter()
        .map(|(id, title)| {
            format!(r#"<div class="card"><strong>{title}</strong><div id="{id}">-</div></div>"#)
        })
        .collect();

    format!(
        r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>CGF Device Dashboard</title>
<script src="{PLOTLY_JS}"></script>
<style>
body {{ font-family: sans-serif; margin: 2em; }}
.cards {{ display: grid; grid-template-columns: repeat(4, 1fr); gap: 1em; margin-bottom: 1.5em; }}
.card {{ border: 1px solid #ddd; border-radius: 6px; padding: 1em; }}
table {{ border-collapse: collapse; overflow-x: auto; display: block; }}
th, td {{ border: 1px solid #ddd; padding: 4px 8px; text-align: left; min-width: 100px; }}
</style>
</head>
<body>
<h2>CGF System Metrics Dashboard</h2>
<p>
<select id="device-input"><option value="">Select Device ID</option></select>
<button id="export-btn">Export to Excel</button>
</p>
<div class="cards">{cards}</div>
<h3>Daily Gas Production (last 90 days)</h3>
<div id="gas-production-graph"></div>
<h3>Device Data</h3>
<div id="device-data-table"></div>
<script>{SCRIPT}</script>
</body>
</html>"#
    )
}

pub async fn index() -> Html<String> {
    metrics::counter!("http_requests_total", "route" => "index").increment(1);
    Html(render())
}
