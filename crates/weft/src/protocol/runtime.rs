/// Consumer runtime, evaluated once per page by the bootstrap script.
///
/// The expression is a factory: called with the document and its options it
/// returns the page's runtime instance exposing `inject`, `resume`,
/// `resumed`, `state` and `activate`. Fragments that need activation are
/// queued and activated at idle time; interacting with a queued fragment
/// activates it at once. With `resumable` set, idle activation waits for
/// `resumed()` so that every fragment sees its state.
/// Activation dispatches a bubbling `weft:activate` event on every top-level
/// element of the fragment with `{ id, state }` as detail.
pub const RUNTIME_SOURCE: &str = r#"(function (doc, options) {
  var win = doc.defaultView || window;
  var held = !!(options && options.resumable);
  var queue = [];
  var nodes = Object.create(null);
  var states = Object.create(null);
  var done = Object.create(null);
  var scheduled = false;
  var idle = win.requestIdleCallback
    ? function (cb) { win.requestIdleCallback(cb); }
    : function (cb) { win.setTimeout(function () { cb({ timeRemaining: function () { return 8; } }); }, 1); };

  function placeholder(id) {
    return doc.querySelector('weft-boundary[data-boundary-id="' + id + '"]');
  }

  function activate(id) {
    if (done[id] || !nodes[id]) return;
    done[id] = true;
    var i = queue.indexOf(id);
    if (i !== -1) queue.splice(i, 1);
    nodes[id].forEach(function (node) {
      if (node.nodeType !== 1) return;
      node.dispatchEvent(new CustomEvent('weft:activate', {
        bubbles: true,
        detail: { id: id, state: states[id] }
      }));
    });
  }

  function drain(deadline) {
    scheduled = false;
    while (queue.length && deadline.timeRemaining() > 1) activate(queue[0]);
    if (queue.length) schedule();
  }

  function schedule() {
    if (held || scheduled) return;
    scheduled = true;
    idle(drain);
  }

  function interact(event) {
    var target = event.target;
    var owner = target && target.closest ? target.closest('[data-weft-fragment]') : null;
    if (owner) activate(owner.getAttribute('data-weft-fragment'));
  }

  ['pointerdown', 'focusin', 'keydown'].forEach(function (type) {
    doc.addEventListener(type, interact, true);
  });

  return {
    inject: function (id, markup, needsActivation) {
      id = String(id);
      var slot = placeholder(id);
      if (!slot || nodes[id]) return;
      var template = doc.createElement('template');
      template.innerHTML = markup;
      var fragment = template.content;
      var inserted = Array.prototype.slice.call(fragment.childNodes);
      inserted.forEach(function (node) {
        if (node.nodeType === 1 && needsActivation) node.setAttribute('data-weft-fragment', id);
      });
      slot.parentNode.replaceChild(fragment, slot);
      nodes[id] = inserted;
      if (needsActivation) {
        queue.push(id);
        schedule();
      } else {
        done[id] = true;
      }
    },
    resume: function (id, state) {
      states[String(id)] = state;
    },
    resumed: function () {
      held = false;
      if (queue.length) schedule();
      doc.dispatchEvent(new CustomEvent('weft:resumed'));
    },
    state: function (id) {
      return states[String(id)];
    },
    activate: function (id) {
      activate(String(id));
    }
  };
})"#;
