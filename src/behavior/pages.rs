//! Static HTML pages.

pub const WELCOME_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>faultline</title></head>
<body>
<h1>faultline</h1>
<p>A fault-injection HTTP server for testing client behavior.</p>
<ul>
<li><code>/silentrejection</code> drops the connection without a response</li>
<li><code>/silenttimeout</code> drops the connection after a delay without a response</li>
<li><code>/noisyrejection</code> streams lines, then drops the connection</li>
<li><code>/noisytimeout</code> streams lines, then ends or times out</li>
<li><code>/bigrandomfile</code> streams a large file of random bytes</li>
<li><code>/checkpattern</code> POST the binary pattern as application/octet-stream</li>
<li><code>/checkstring</code> POST the text pattern as text/plain</li>
<li><code>/checkjson</code> POST the reference document as application/json</li>
<li><code>/silentresponse</code> answers 204 with no body</li>
<li><code>/stop</code> stops the server</li>
</ul>
</body>
</html>
"#;

pub const STOP_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head><meta charset="utf-8"><title>faultline</title></head>
<body><p>Server is stopping.</p></body>
</html>
"#;
