//! Chrome DevTools host: the page bootstrap, its binding channel, and the
//! [`Host`], [`InputDriver`] and [`Capturer`] implementations on a live page.

use std::pin::Pin;

use async_trait::async_trait;
use chromiumoxide::{
	Page,
	cdp::{
		browser_protocol::page::{AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat},
		js_protocol::runtime::{AddBindingParams, EventBindingCalled},
	},
	page::ScreenshotParams,
};
use color_eyre::{Result, eyre::eyre};
use futures::{Stream, StreamExt};
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

use crate::{
	agent::{Host, PageEvent, PageLocation},
	dom::{Element, NodeHandle},
	input::{InputDriver, InputSignal},
	quiz::QuizShape,
	vision::Capturer,
};

/// Name of the page-to-host binding; also the prefix of the page-side API
pub const BINDING: &str = "__questionHelper";

const JPEG_QUALITY: i64 = 85;

/// Installed into every document before its own scripts run.
///
/// Only the top-level frame installs anything: child frames share the binding
/// but not the handle registry the host evaluates against. Keeps a weak registry of handed-out element handles, reports trusted clicks
/// and key presses through the binding, and exposes `window.__questionHelperApi`
/// for snapshots and input primitives.
const BOOTSTRAP: &str = r#"
(() => {
	if (window !== window.top) return;
	if (window.__questionHelperApi) return;
	const send = (event) => {
		try { window.__questionHelper(JSON.stringify(event)); } catch (_) {}
	};
	const CONTAINER = __CONTAINER_TAG__;

	const ids = new WeakMap();
	const nodes = new Map();
	let next = Math.floor(Math.random() * 1e6) * 1e6;
	const handleOf = (el) => {
		let id = ids.get(el);
		if (id === undefined) {
			id = next++;
			ids.set(el, id);
			nodes.set(id, new WeakRef(el));
		}
		return id;
	};
	const nodeOf = (id) => {
		const ref = nodes.get(id);
		const el = ref && ref.deref();
		if (!el || !el.isConnected) {
			nodes.delete(id);
			return null;
		}
		return el;
	};

	const snap = (el) => ({
		tag: el.tagName.toLowerCase(),
		handle: handleOf(el),
		attrs: Array.from(el.attributes, (a) => [a.name, a.value]),
		children: Array.from(el.childNodes).flatMap((n) =>
			n.nodeType === Node.ELEMENT_NODE ? [snap(n)] : n.nodeType === Node.TEXT_NODE ? [{ text: n.data }] : []
		),
		live: {
			checked: !!el.checked,
			rendered: el.offsetParent !== null,
			value: typeof el.value === "string" ? el.value : "",
		},
	});

	const setValue = (el, value) => {
		const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), "value");
		if (desc && desc.set) desc.set.call(el, value);
		else el.value = value;
	};

	window.__questionHelperApi = {
		snapshot: (id) => {
			const el = nodeOf(id);
			return el ? snap(el) : null;
		},
		containers: () => Array.from(document.querySelectorAll(CONTAINER), snap),
		location: () => ({
			url: location.href,
			locale: document.documentElement.lang || navigator.language || "fr",
		}),
		focus: (id) => {
			const el = nodeOf(id);
			if (!el) return false;
			el.focus();
			return true;
		},
		click: (id) => {
			const el = nodeOf(id);
			if (!el) return false;
			el.click();
			return true;
		},
		blur: (id) => {
			const el = nodeOf(id);
			if (!el) return false;
			if (document.activeElement === el) el.blur();
			return true;
		},
		dispatch: (id, s) => {
			const el = nodeOf(id);
			if (!el) return false;
			const opts = { bubbles: true, cancelable: true };
			switch (s.type) {
				case "keyDown": el.dispatchEvent(new KeyboardEvent("keydown", { ...opts, key: s.key })); break;
				case "beforeInput": el.dispatchEvent(new InputEvent("beforeinput", { ...opts, data: s.data, inputType: "insertText" })); break;
				case "input": el.dispatchEvent(new InputEvent("input", { bubbles: true, data: s.data, inputType: "insertText" })); break;
				case "keyUp": el.dispatchEvent(new KeyboardEvent("keyup", { ...opts, key: s.key })); break;
				case "change": el.dispatchEvent(new Event("change", { bubbles: true })); break;
			}
			return true;
		},
		append: (id, ch) => {
			const el = nodeOf(id);
			if (!el) return false;
			setValue(el, el.value + ch);
			return true;
		},
		isChecked: (id) => {
			const el = nodeOf(id);
			return el ? !!el.checked : null;
		},
		setChecked: (id, checked) => {
			const el = nodeOf(id);
			if (!el) return false;
			el.checked = checked;
			return true;
		},
	};

	document.addEventListener("click", (ev) => {
		if (!ev.isTrusted || !(ev.target instanceof Element)) return;
		const container = ev.target.closest(CONTAINER);
		const submit = !!ev.target.closest('input[type="submit"], button[type="submit"]');
		send({ kind: "click", container: container ? handleOf(container) : null, submit });
	}, true);

	document.addEventListener("keydown", (ev) => {
		if (!ev.isTrusted) return;
		send({ kind: "key", key: ev.key, code: ev.code, repeat: ev.repeat });
	}, true);

	send({ kind: "ready" });
})()
"#;

/// Render the bootstrap for the configured container tag
pub fn bootstrap_script(shape: &QuizShape) -> String {
	let tag = serde_json::to_string(&shape.container_tag).unwrap_or_else(|_| "\"fieldset\"".to_string());
	BOOTSTRAP.replace("__CONTAINER_TAG__", &tag)
}

fn signal_json(signal: &InputSignal) -> Value {
	match signal {
		InputSignal::KeyDown { key } => json!({ "type": "keyDown", "key": key }),
		InputSignal::BeforeInput { data } => json!({ "type": "beforeInput", "data": data }),
		InputSignal::Input { data } => json!({ "type": "input", "data": data }),
		InputSignal::KeyUp { key } => json!({ "type": "keyUp", "key": key }),
		InputSignal::Change => json!({ "type": "change" }),
	}
}

fn parse_event(payload: &str) -> Option<PageEvent> {
	match serde_json::from_str(payload) {
		Ok(event) => Some(event),
		Err(e) => {
			tracing::warn!("Unrecognised page event {payload:?}: {e}");
			None
		}
	}
}

/// CDP reports a JS `null` as an absent value
fn decode_page_value<T: DeserializeOwned>(value: Option<&Value>) -> serde_json::Result<T> {
	serde_json::from_value(value.cloned().unwrap_or(Value::Null))
}

pub type PageEvents = Pin<Box<dyn Stream<Item = PageEvent> + Send>>;

#[derive(Clone, Debug)]
pub struct PageHost {
	page: Page,
}

impl PageHost {
	/// Install the binding and bootstrap on `page` and start listening.
	///
	/// The bootstrap is registered for every future document and also run once
	/// in the current one.
	pub async fn attach(page: Page, shape: &QuizShape) -> Result<(Self, PageEvents)> {
		let script = bootstrap_script(shape);
		let calls = page
			.event_listener::<EventBindingCalled>()
			.await
			.map_err(|e| eyre!("Failed to listen for page events: {}", e))?;
		page.execute(AddBindingParams::new(BINDING))
			.await
			.map_err(|e| eyre!("Failed to add page binding: {}", e))?;
		page.execute(AddScriptToEvaluateOnNewDocumentParams::new(script.clone()))
			.await
			.map_err(|e| eyre!("Failed to register page bootstrap: {}", e))?;
		page.evaluate(script).await.map_err(|e| eyre!("Failed to run page bootstrap: {}", e))?;

		let events = calls.filter_map(|call| futures::future::ready(if call.name == BINDING { parse_event(&call.payload) } else { None }));
		Ok((Self { page }, Box::pin(events)))
	}

	async fn call<T: DeserializeOwned>(&self, method: &str, args: &[Value]) -> Result<T> {
		let args = args.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
		let script = format!("window.{BINDING}Api.{method}({args})");
		let result = self.page.evaluate(script).await.map_err(|e| eyre!("Failed to call page {}: {}", method, e))?;
		decode_page_value(result.value()).map_err(|e| eyre!("Unexpected result from page {}: {}", method, e))
	}

	/// Node primitives answer `false` once the element left the document
	async fn act(&self, method: &str, node: NodeHandle, extra: &[Value]) -> Result<()> {
		let mut args = vec![json!(node)];
		args.extend_from_slice(extra);
		match self.call::<bool>(method, &args).await? {
			true => Ok(()),
			false => Err(eyre!("Element {} is no longer in the page", node)),
		}
	}
}

#[async_trait]
impl InputDriver for PageHost {
	async fn focus(&self, node: NodeHandle) -> Result<()> {
		self.act("focus", node, &[]).await
	}

	async fn click(&self, node: NodeHandle) -> Result<()> {
		self.act("click", node, &[]).await
	}

	async fn blur_if_focused(&self, node: NodeHandle) -> Result<()> {
		self.act("blur", node, &[]).await
	}

	async fn dispatch(&self, node: NodeHandle, signal: &InputSignal) -> Result<()> {
		self.act("dispatch", node, &[signal_json(signal)]).await
	}

	async fn append_char(&self, node: NodeHandle, ch: char) -> Result<()> {
		self.act("append", node, &[json!(ch.to_string())]).await
	}

	async fn is_checked(&self, node: NodeHandle) -> Result<bool> {
		self.call::<Option<bool>>("isChecked", &[json!(node)])
			.await?
			.ok_or_else(|| eyre!("Element {} is no longer in the page", node))
	}

	async fn set_checked(&self, node: NodeHandle, checked: bool) -> Result<()> {
		self.act("setChecked", node, &[json!(checked)]).await
	}
}

#[async_trait]
impl Host for PageHost {
	async fn snapshot(&self, container: NodeHandle) -> Result<Option<Element>> {
		self.call("snapshot", &[json!(container)]).await
	}

	async fn containers(&self) -> Result<Vec<Element>> {
		self.call("containers", &[]).await
	}

	async fn location(&self) -> Result<PageLocation> {
		self.call("location", &[]).await
	}
}

#[async_trait]
impl Capturer for PageHost {
	async fn has_viewport(&self) -> bool {
		matches!(self.page.url().await, Ok(Some(_)))
	}

	async fn capture_viewport(&self) -> Result<Vec<u8>> {
		let params = ScreenshotParams::builder().format(CaptureScreenshotFormat::Jpeg).quality(JPEG_QUALITY).build();
		self.page.screenshot(params).await.map_err(|e| eyre!("Failed to capture viewport: {}", e))
	}
}
