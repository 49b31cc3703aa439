//! Server-rendered HTML

use histstore::{GridSpec, ScanOrder};

use crate::handler::GridSummary;

const STYLE: &str = r#"
      body { font-family: ui-sans-serif, system-ui, -apple-system, Segoe UI, sans-serif; margin: 2rem; max-width: 60rem; }
      label { display: inline-block; min-width: 7rem; }
      fieldset { margin-bottom: 1rem; }
      .error { color: #b00020; font-weight: 600; }
      table.summary td { padding: 0.1rem 0.8rem 0.1rem 0; }
      pre { background: #f4f4f4; padding: 0.6rem; overflow-x: auto; }
      #bars { display: flex; align-items: flex-end; height: 12rem; gap: 1px; border-bottom: 1px solid #888; }
      #bars div { background: #3869b1; flex: 1; min-width: 1px; }
"#;

/// Escape text for HTML bodies and attribute values
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Upload form, optionally with an error banner
pub fn index(defaults: &GridSpec, error: Option<&str>) -> String {
    let banner = error
        .map(|message| format!(r#"<p class="error">{}</p>"#, escape(message)))
        .unwrap_or_default();
    let (ieta_selected, iphi_selected) = match defaults.order {
        ScanOrder::IetaMajor => (" selected", ""),
        ScanOrder::IphiMajor => ("", " selected"),
    };

    format!(
        r##"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Histogram grid</title>
    <style>{style}</style>
  </head>
  <body>
    <h1>Histogram grid</h1>
    {banner}
    <form method="post" action="/upload" enctype="multipart/form-data">
      <fieldset>
        <legend>Container</legend>
        <input type="file" name="rootfile" required />
      </fieldset>
      <fieldset>
        <legend>Positional fallback grid</legend>
        <p><label for="n_ieta">ieta rows</label><input id="n_ieta" name="n_ieta" placeholder="{n_ieta}" /></p>
        <p><label for="n_iphi">iphi columns</label><input id="n_iphi" name="n_iphi" placeholder="{n_iphi}" /></p>
        <p><label for="ieta_min">first ieta</label><input id="ieta_min" name="ieta_min" placeholder="{ieta_min}" /></p>
        <p><label for="iphi_min">first iphi</label><input id="iphi_min" name="iphi_min" placeholder="{iphi_min}" /></p>
        <p><label for="order">scan order</label>
          <select id="order" name="order">
            <option value="ieta-major"{ieta_selected}>ieta-major</option>
            <option value="iphi-major"{iphi_selected}>iphi-major</option>
          </select>
        </p>
      </fieldset>
      <button type="submit">Upload</button>
    </form>
  </body>
</html>
"##,
        style = STYLE,
        banner = banner,
        n_ieta = defaults.n_ieta,
        n_iphi = defaults.n_iphi,
        ieta_min = defaults.ieta_min,
        iphi_min = defaults.iphi_min,
        ieta_selected = ieta_selected,
        iphi_selected = iphi_selected,
    )
}

/// Session page with the cell lookup form
pub fn grid(summary: &GridSummary) -> String {
    let token = escape(&summary.token);

    format!(
        r##"<!doctype html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <title>Histogram grid - {upload}</title>
    <style>{style}</style>
  </head>
  <body>
    <h1>{upload}</h1>
    <table class="summary">
      <tr><td>Stored as</td><td>{file}</td></tr>
      <tr><td>Grid</td><td>{n_ieta} x {n_iphi}</td></tr>
      <tr><td>First cell</td><td>ieta {ieta_min}, iphi {iphi_min}</td></tr>
      <tr><td>Scan order</td><td>{order}</td></tr>
      <tr><td>Histograms</td><td>{histograms}</td></tr>
      <tr><td>Mapped cells</td><td>{matched} ({strategy})</td></tr>
    </table>

    <form id="lookup">
      <label for="ieta">ieta</label><input id="ieta" name="ieta" size="6" />
      <label for="iphi">iphi</label><input id="iphi" name="iphi" size="6" />
      <button type="submit">Show</button>
    </form>
    <p id="status"></p>
    <div id="bars"></div>
    <pre id="info"></pre>

    <p><a href="/">Upload another file</a> | <a href="/cells?token={token}">cells</a> | <a href="/session/{token}">session</a></p>

    <script>
      const token = "{token}";
      const status = document.getElementById("status");
      const bars = document.getElementById("bars");
      const info = document.getElementById("info");

      document.getElementById("lookup").addEventListener("submit", async (ev) => {{
        ev.preventDefault();
        const ieta = document.getElementById("ieta").value;
        const iphi = document.getElementById("iphi").value;
        const params = new URLSearchParams({{ token, ieta, iphi }});
        bars.innerHTML = "";
        info.textContent = "";

        const res = await fetch("/hist?" + params.toString());
        if (!res.ok) {{
          status.textContent = await res.text();
          return;
        }}
        const body = await res.json();
        if (!body.found) {{
          status.textContent = `No histogram at ieta ${{body.ieta}}, iphi ${{body.iphi}}`;
          return;
        }}

        status.textContent = body.key;
        const peak = Math.max(...body.counts, 1e-12);
        for (const c of body.counts) {{
          const bar = document.createElement("div");
          bar.style.height = `${{Math.max(0, c) / peak * 100}}%`;
          bars.appendChild(bar);
        }}
        info.textContent = JSON.stringify(body.info, null, 2);
      }});
    </script>
  </body>
</html>
"##,
        style = STYLE,
        upload = escape(&summary.upload_name),
        file = escape(&summary.file),
        n_ieta = summary.n_ieta,
        n_iphi = summary.n_iphi,
        ieta_min = summary.ieta_min,
        iphi_min = summary.iphi_min,
        order = escape(&summary.order),
        histograms = summary.histograms,
        matched = summary.matched,
        strategy = escape(&summary.strategy),
        token = token,
    )
}
